//! Invoice model and numbering scheme.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PaymentStatus;

/// One emailed receipt for one purchased plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub invoice_number: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: Option<String>,
    pub plan_id: String,
    pub plan_title: String,
    /// Amount charged for this plan, in minor units.
    pub amount: u64,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// Calendar-month scope of an invoice sequence, e.g. `202610`.
///
/// Months are UTC months.
pub fn invoice_month(at: DateTime<Utc>) -> String {
    at.format("%Y%m").to_string()
}

/// `INV-{YYYYMM}-{seq:04}`. Sequences past 9999 keep growing in width.
pub fn format_invoice_number(month: &str, sequence: u32) -> String {
    format!("INV-{}-{:04}", month, sequence)
}
