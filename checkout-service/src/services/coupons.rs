//! Static coupon list and percentage discounts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A code that takes `discount` percent off the subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    /// Whole percent, 0..=100.
    pub discount: u8,
}

/// A coupon applied to a concrete subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub code: String,
    pub percent: u8,
    /// Minor units.
    pub discount: u64,
}

/// `round(subtotal * percent / 100)`, never more than `subtotal`.
pub fn percentage_discount(subtotal: u64, percent: u8) -> u64 {
    let percent = u128::from(percent.min(100));
    let discount = (u128::from(subtotal) * percent + 50) / 100;
    (discount as u64).min(subtotal)
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Lookup table of known coupons, keyed by normalized code.
#[derive(Debug, Clone, Default)]
pub struct CouponBook {
    coupons: HashMap<String, Coupon>,
}

impl CouponBook {
    pub fn new(coupons: impl IntoIterator<Item = Coupon>) -> Result<Self, anyhow::Error> {
        let mut book = HashMap::new();
        for coupon in coupons {
            if coupon.discount > 100 {
                anyhow::bail!(
                    "coupon {} has discount {}%, above 100%",
                    coupon.code,
                    coupon.discount
                );
            }
            let key = normalize(&coupon.code);
            if key.is_empty() {
                anyhow::bail!("coupon with empty code");
            }
            book.insert(key, coupon);
        }
        Ok(Self { coupons: book })
    }

    /// Codes shipped with the storefront.
    pub fn builtin() -> Self {
        let coupons = [
            ("DOWNDATING10", 10),
            ("FIRSTDATE20", 20),
            ("VALENTINE25", 25),
            ("FREEDATE", 100),
        ];
        Self {
            coupons: coupons
                .into_iter()
                .map(|(code, discount)| {
                    (
                        code.to_string(),
                        Coupon {
                            code: code.to_string(),
                            discount,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Load `[{"code": "...", "discount": 10}, ...]`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading coupons from {}: {}", path.display(), e))?;
        let coupons: Vec<Coupon> = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing coupons from {}: {}", path.display(), e))?;
        Self::new(coupons)
    }

    /// Case-insensitive, whitespace-trimmed exact match.
    pub fn lookup(&self, code: &str) -> Option<&Coupon> {
        self.coupons.get(&normalize(code))
    }

    /// `None` for unknown codes.
    pub fn apply(&self, code: &str, subtotal: u64) -> Option<AppliedCoupon> {
        self.lookup(code).map(|coupon| AppliedCoupon {
            code: coupon.code.clone(),
            percent: coupon.discount,
            discount: percentage_discount(subtotal, coupon.discount),
        })
    }

    pub fn len(&self) -> usize {
        self.coupons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coupons.is_empty()
    }
}
