//! Shopper-side cart.
//!
//! Persisted storage is the source of truth. `CartStore` is a write-through
//! view over it: every mutation is saved first and only then published to
//! subscribers. Writes made elsewhere (another tab, another process) are
//! picked up through [`CartStore::on_storage_change`], never by re-reading
//! storage on each mutation.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::models::Plan;
use crate::services::coupons::{percentage_discount, AppliedCoupon, CouponBook};
use crate::services::pricing::LineRequest;

/// Storage key the cart lives under.
pub const CART_STORAGE_KEY: &str = "downdating-cart";

const DEFAULT_ICON: &str = "/logo.jpg";

#[derive(Debug, Error)]
pub enum CartError {
    #[error("Cart storage failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Cart could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid coupon code: {0}")]
    InvalidCoupon(String),
}

fn default_quantity() -> u32 {
    1
}

/// One selected plan. `price` is the snapshot taken when it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub title: String,
    pub price: u64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Application form for the plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

impl CartItem {
    pub fn line_total(&self) -> u64 {
        self.price.saturating_mul(u64::from(self.quantity))
    }
}

impl From<&Plan> for CartItem {
    fn from(plan: &Plan) -> Self {
        Self {
            id: plan.id.clone(),
            title: plan.title.clone(),
            price: plan.price,
            category: plan.category(),
            icon: Some(DEFAULT_ICON.to_string()),
            href: plan.google_form_url.clone(),
            quantity: 1,
        }
    }
}

/// Snapshot published to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    pub items: Vec<CartItem>,
    /// Sum of `price * quantity`, minor units.
    pub total: u64,
    /// Number of distinct lines.
    pub item_count: usize,
    pub coupon: Option<AppliedCoupon>,
    pub payable: u64,
}

impl CartState {
    fn from_items(items: Vec<CartItem>, coupon_code: Option<(&str, u8)>) -> Self {
        let total = items
            .iter()
            .fold(0u64, |acc, item| acc.saturating_add(item.line_total()));
        let coupon = coupon_code.map(|(code, percent)| AppliedCoupon {
            code: code.to_string(),
            percent,
            discount: percentage_discount(total, percent),
        });
        let discount = coupon.as_ref().map_or(0, |c| c.discount);

        Self {
            item_count: items.len(),
            payable: total - discount,
            total,
            items,
            coupon,
        }
    }

    pub fn plan_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.id.clone()).collect()
    }

    pub fn line_requests(&self) -> Vec<LineRequest> {
        self.items
            .iter()
            .map(|i| LineRequest {
                plan_id: i.id.clone(),
                quantity: i.quantity,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Raw key/value persistence for the cart.
pub trait CartStorage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, CartError>;
    fn save(&self, key: &str, value: &str) -> Result<(), CartError>;
    fn remove(&self, key: &str) -> Result<(), CartError>;
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileCartStorage {
    dir: PathBuf,
}

impl FileCartStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CartError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl CartStorage for FileCartStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CartError> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CartError> {
        // Atomic replace.
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CartError> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCartStorage {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryCartStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CartStorage for MemoryCartStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CartError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CartError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CartError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Drop repeated plan ids, keeping the first, and normalise quantities.
fn normalize(items: Vec<CartItem>) -> Vec<CartItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .map(|mut item| {
            item.quantity = item.quantity.max(1);
            item
        })
        .collect()
}

pub struct CartStore {
    storage: Arc<dyn CartStorage>,
    coupons: Arc<CouponBook>,
    state: watch::Sender<CartState>,
}

impl CartStore {
    /// Hydrate from storage. A corrupted entry is discarded and the cart
    /// starts empty.
    pub fn open(storage: Arc<dyn CartStorage>, coupons: Arc<CouponBook>) -> Self {
        let items = match storage.load(CART_STORAGE_KEY) {
            Ok(Some(raw)) => parse_or_discard(storage.as_ref(), &raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted cart; starting empty");
                Vec::new()
            }
        };

        let (state, _) = watch::channel(CartState::from_items(items, None));
        Self {
            storage,
            coupons,
            state,
        }
    }

    pub fn state(&self) -> CartState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.state.subscribe()
    }

    /// Append `item` unless a line with its id exists. Returns whether the
    /// cart changed.
    pub fn add(&self, item: CartItem) -> Result<bool, CartError> {
        let current = self.state();
        if current.items.iter().any(|i| i.id == item.id) {
            return Ok(false);
        }
        let mut items = current.items;
        items.push(item);
        self.commit(normalize(items), current.coupon)?;
        Ok(true)
    }

    pub fn remove(&self, id: &str) -> Result<bool, CartError> {
        let current = self.state();
        let before = current.items.len();
        let items: Vec<CartItem> = current.items.into_iter().filter(|i| i.id != id).collect();
        if items.len() == before {
            return Ok(false);
        }
        self.commit(items, current.coupon)?;
        Ok(true)
    }

    /// Empty the cart and drop any coupon.
    pub fn clear(&self) -> Result<(), CartError> {
        self.commit(Vec::new(), None)
    }

    /// Replace the cart wholesale.
    pub fn load(&self, items: Vec<CartItem>) -> Result<(), CartError> {
        let coupon = self.state().coupon;
        self.commit(normalize(items), coupon)
    }

    /// Apply a code, replacing any previous one. An unknown code clears the
    /// applied discount.
    pub fn apply_coupon(&self, code: &str) -> Result<AppliedCoupon, CartError> {
        let current = self.state();
        match self.coupons.lookup(code) {
            Some(coupon) => {
                let applied = AppliedCoupon {
                    code: coupon.code.clone(),
                    percent: coupon.discount,
                    discount: percentage_discount(current.total, coupon.discount),
                };
                self.publish(current.items, Some(applied.clone()));
                Ok(applied)
            }
            None => {
                self.publish(current.items, None);
                Err(CartError::InvalidCoupon(code.trim().to_string()))
            }
        }
    }

    pub fn remove_coupon(&self) {
        let current = self.state();
        self.publish(current.items, None);
    }

    /// Reconcile with a write made outside this store. `None` means the
    /// entry was removed.
    pub fn on_storage_change(&self, raw: Option<&str>) {
        let items = match raw {
            Some(raw) => parse_or_discard(self.storage.as_ref(), raw),
            None => Vec::new(),
        };
        let coupon = self.state().coupon;
        self.publish(items, coupon);
    }

    fn commit(&self, items: Vec<CartItem>, coupon: Option<AppliedCoupon>) -> Result<(), CartError> {
        let raw = serde_json::to_string(&items)?;
        self.storage.save(CART_STORAGE_KEY, &raw)?;
        self.publish(items, coupon);
        Ok(())
    }

    fn publish(&self, items: Vec<CartItem>, coupon: Option<AppliedCoupon>) {
        let coupon = coupon.as_ref().map(|c| (c.code.as_str(), c.percent));
        self.state.send_replace(CartState::from_items(items, coupon));
    }
}

fn parse_or_discard(storage: &dyn CartStorage, raw: &str) -> Vec<CartItem> {
    match serde_json::from_str::<Vec<CartItem>>(raw) {
        Ok(items) => normalize(items),
        Err(e) => {
            tracing::warn!(error = %e, "Discarding corrupted persisted cart");
            if let Err(e) = storage.remove(CART_STORAGE_KEY) {
                tracing::warn!(error = %e, "Failed to discard corrupted cart");
            }
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, price: u64) -> CartItem {
        CartItem {
            id: id.to_string(),
            title: format!("{} plan", id),
            price,
            category: "Plan".to_string(),
            icon: None,
            href: None,
            quantity: 1,
        }
    }

    fn store_with(storage: Arc<dyn CartStorage>) -> CartStore {
        CartStore::open(storage, Arc::new(CouponBook::builtin()))
    }

    #[test]
    fn add_is_idempotent_per_plan() {
        let store = store_with(Arc::new(MemoryCartStorage::new()));

        assert!(store.add(item("gold", 149_900)).unwrap());
        assert!(!store.add(item("gold", 149_900)).unwrap());
        assert!(store.add(item("silver", 99_900)).unwrap());

        let state = store.state();
        assert_eq!(state.item_count, 2);
        assert_eq!(state.total, 249_800);
    }

    #[test]
    fn totals_use_quantity() {
        let store = store_with(Arc::new(MemoryCartStorage::new()));
        let mut pair = item("duo", 50_000);
        pair.quantity = 2;
        store.add(pair).unwrap();
        store.add(item("solo", 10_000)).unwrap();

        let state = store.state();
        assert_eq!(state.total, 110_000);
        assert_eq!(state.item_count, 2);
    }

    #[test]
    fn remove_and_clear_recompute_totals() {
        let store = store_with(Arc::new(MemoryCartStorage::new()));
        store.add(item("gold", 149_900)).unwrap();
        store.add(item("silver", 99_900)).unwrap();

        assert!(store.remove("gold").unwrap());
        assert!(!store.remove("gold").unwrap());
        assert_eq!(store.state().total, 99_900);

        store.clear().unwrap();
        let state = store.state();
        assert!(state.is_empty());
        assert_eq!(state.total, 0);
        assert_eq!(state.item_count, 0);
    }

    #[test]
    fn every_mutation_is_written_through() {
        let storage = Arc::new(MemoryCartStorage::new());
        let store = store_with(storage.clone());
        store.add(item("gold", 149_900)).unwrap();

        let reopened = store_with(storage.clone());
        assert_eq!(reopened.state().items, vec![item("gold", 149_900)]);

        store.clear().unwrap();
        assert_eq!(storage.load(CART_STORAGE_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn corrupted_persisted_cart_starts_empty_and_is_discarded() {
        let storage = Arc::new(MemoryCartStorage::new());
        storage.save(CART_STORAGE_KEY, "{not json").unwrap();

        let store = store_with(storage.clone());

        assert!(store.state().is_empty());
        assert_eq!(storage.load(CART_STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn load_keeps_first_of_duplicate_ids() {
        let store = store_with(Arc::new(MemoryCartStorage::new()));
        store
            .load(vec![item("gold", 1), item("gold", 2), item("silver", 3)])
            .unwrap();

        let state = store.state();
        assert_eq!(state.item_count, 2);
        assert_eq!(state.items[0].price, 1);
    }

    #[test]
    fn coupon_is_replaced_and_invalid_code_resets_discount() {
        let store = store_with(Arc::new(MemoryCartStorage::new()));
        store.add(item("gold", 100_000)).unwrap();

        let applied = store.apply_coupon(" downdating10 ").unwrap();
        assert_eq!(applied.discount, 10_000);
        assert_eq!(store.state().payable, 90_000);

        store.apply_coupon("FIRSTDATE20").unwrap();
        assert_eq!(store.state().payable, 80_000);

        assert!(matches!(
            store.apply_coupon("NOPE"),
            Err(CartError::InvalidCoupon(_))
        ));
        let state = store.state();
        assert!(state.coupon.is_none());
        assert_eq!(state.payable, 100_000);
    }

    #[test]
    fn discount_follows_cart_changes() {
        let store = store_with(Arc::new(MemoryCartStorage::new()));
        store.add(item("gold", 100_000)).unwrap();
        store.apply_coupon("VALENTINE25").unwrap();
        store.add(item("silver", 20_000)).unwrap();

        let state = store.state();
        assert_eq!(state.coupon.as_ref().map(|c| c.discount), Some(30_000));
        assert_eq!(state.payable, 90_000);
    }

    #[test]
    fn external_write_is_reconciled_and_notified() {
        let storage = Arc::new(MemoryCartStorage::new());
        let store = store_with(storage.clone());
        let mut rx = store.subscribe();

        let other_tab = serde_json::to_string(&vec![item("gold", 149_900)]).unwrap();
        storage.save(CART_STORAGE_KEY, &other_tab).unwrap();
        store.on_storage_change(Some(&other_tab));

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().item_count, 1);

        store.on_storage_change(Some("garbage"));
        assert!(store.state().is_empty());
        assert_eq!(storage.load(CART_STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn CartStorage> = Arc::new(FileCartStorage::new(dir.path()).unwrap());
        let store = store_with(storage.clone());
        store.add(item("gold", 149_900)).unwrap();

        let reopened = store_with(Arc::new(FileCartStorage::new(dir.path()).unwrap()));
        assert_eq!(reopened.state().total, 149_900);
    }

    #[test]
    fn item_from_plan_carries_form_link() {
        let plan = Plan {
            id: "gold".into(),
            title: "Gold".into(),
            price: 149_900,
            original_price: None,
            description: String::new(),
            features: vec![],
            popular: false,
            period: None,
            google_form_url: Some("https://forms.example/gold".into()),
        };
        let item = CartItem::from(&plan);
        assert_eq!(item.category, "Plan");
        assert_eq!(item.href.as_deref(), Some("https://forms.example/gold"));
        assert_eq!(item.quantity, 1);
    }
}
