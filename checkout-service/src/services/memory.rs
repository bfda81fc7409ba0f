//! In-process implementations of the store and object-storage seams.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    normalize_email, ApplicationFilter, Invoice, NewTransaction, PaymentStatus, Plan,
    PlanApplication, TransactionRecord,
};
use crate::services::storage::{ObjectStorage, StorageError};
use crate::services::store::{
    ApplicationStore, CheckoutStore, InvoiceStore, PlanCatalog, StoreError, TransactionStore,
};

#[derive(Default)]
struct MemoryInner {
    plans: DashMap<String, Plan>,
    // keyed by gateway order id
    transactions: DashMap<String, TransactionRecord>,
    // keyed by invoice number
    invoices: DashMap<String, Invoice>,
    invoice_counters: DashMap<String, u32>,
    applications: DashMap<String, PlanApplication>,
}

/// DashMap-backed store. Cloning shares the underlying maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: impl IntoIterator<Item = Plan>) -> Self {
        let store = Self::new();
        for plan in plans {
            store.upsert_plan(plan);
        }
        store
    }

    pub fn upsert_plan(&self, plan: Plan) {
        self.inner.plans.insert(plan.id.clone(), plan);
    }

    /// Force the month counter, e.g. to simulate a counter that lags behind
    /// existing invoice rows.
    pub fn set_invoice_counter(&self, month: &str, value: u32) {
        self.inner.invoice_counters.insert(month.to_string(), value);
    }

    pub fn transaction_count(&self) -> usize {
        self.inner.transactions.len()
    }

    pub fn invoice_count(&self) -> usize {
        self.inner.invoices.len()
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        self.inner
            .invoices
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl PlanCatalog for MemoryStore {
    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let mut plans: Vec<Plan> = self
            .inner
            .plans
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        plans.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(plans)
    }

    async fn get_plan(&self, id: &str) -> Result<Option<Plan>, StoreError> {
        Ok(self.inner.plans.get(id).map(|plan| plan.value().clone()))
    }

    async fn plans_by_ids(&self, ids: &[String]) -> Result<Vec<Plan>, StoreError> {
        let mut plans: Vec<Plan> = ids
            .iter()
            .filter_map(|id| self.inner.plans.get(id).map(|plan| plan.value().clone()))
            .collect();
        plans.sort_by(|a, b| a.id.cmp(&b.id));
        plans.dedup_by(|a, b| a.id == b.id);
        Ok(plans)
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn record_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        match self
            .inner
            .transactions
            .entry(transaction.razorpay_order_id.clone())
        {
            Entry::Occupied(entry) => Err(StoreError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                let record = transaction.into_record(Uuid::new_v4().to_string(), Utc::now());
                entry.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn transaction_by_order(
        &self,
        order_id: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(self
            .inner
            .transactions
            .get(order_id)
            .map(|record| record.value().clone()))
    }

    async fn update_transaction_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
    ) -> Result<TransactionRecord, StoreError> {
        let mut record = self
            .inner
            .transactions
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction for order {}", order_id)))?;

        let current = record.payment_status;
        if current == status {
            return Ok(record.clone());
        }
        if !current.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        record.payment_status = status;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn reserve_invoice_sequence(&self, month: &str) -> Result<u32, StoreError> {
        let mut counter = self
            .inner
            .invoice_counters
            .entry(month.to_string())
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError> {
        match self.inner.invoices.entry(invoice.invoice_number.clone()) {
            Entry::Occupied(entry) => Err(StoreError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(Invoice {
                    email: normalize_email(&invoice.email),
                    ..invoice.clone()
                });
                Ok(())
            }
        }
    }

    async fn get_invoice(&self, invoice_number: &str) -> Result<Option<Invoice>, StoreError> {
        Ok(self
            .inner
            .invoices
            .get(invoice_number)
            .map(|invoice| invoice.value().clone()))
    }

    async fn invoices_by_email(&self, email: &str) -> Result<Vec<Invoice>, StoreError> {
        let email = normalize_email(email);
        let mut invoices: Vec<Invoice> = self
            .inner
            .invoices
            .iter()
            .filter(|entry| entry.value().email == email)
            .map(|entry| entry.value().clone())
            .collect();
        invoices.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.invoice_number.cmp(&a.invoice_number))
        });
        Ok(invoices)
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn insert_application(&self, application: &PlanApplication) -> Result<(), StoreError> {
        self.inner.applications.insert(
            application.id.clone(),
            PlanApplication {
                email: normalize_email(&application.email),
                ..application.clone()
            },
        );
        Ok(())
    }

    async fn list_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<PlanApplication>, StoreError> {
        let email = filter.email.as_deref().map(normalize_email);
        let mut applications: Vec<PlanApplication> = self
            .inner
            .applications
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|app| match (&email, &filter.order_id) {
                (Some(email), _) => &app.email == email,
                (None, Some(order_id)) => app.razorpay_order_id.as_deref() == Some(order_id),
                (None, None) => true,
            })
            .collect();
        applications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        applications.truncate(filter.limit as usize);
        Ok(applications)
    }
}

#[async_trait]
impl CheckoutStore for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Object storage that keeps uploads in memory and hands out `memory://` URLs.
#[derive(Clone, Default)]
pub struct MemoryObjectStorage {
    objects: Arc<DashMap<String, (String, Vec<u8>)>>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::EmptyObject);
        }
        let key = format!("payment-screenshots/{}-{}", Uuid::new_v4(), filename);
        self.objects
            .insert(key.clone(), (content_type.to_string(), bytes));
        Ok(format!("memory://{}", key))
    }
}
