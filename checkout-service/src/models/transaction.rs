use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Contact details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CustomerInfo {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 7, max = 20, message = "a valid phone number is required"))]
    pub phone: String,
}

/// Canonical form used to store and look up customer emails.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Pending may settle either way; settled records are terminal.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
        )
    }

    /// Capitalised label used on invoices.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one checkout attempt, keyed by the gateway order id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: Option<String>,
    pub plan_ids: Vec<String>,
    pub plan_titles: Vec<String>,
    pub total_amount: u64,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for the transaction recorder.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub customer: CustomerInfo,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: Option<String>,
    pub plan_ids: Vec<String>,
    pub plan_titles: Vec<String>,
    pub total_amount: u64,
    pub currency: String,
    pub payment_status: PaymentStatus,
}

impl NewTransaction {
    pub fn into_record(self, id: String, now: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            id,
            name: self.customer.name,
            email: self.customer.email,
            phone: self.customer.phone,
            razorpay_order_id: self.razorpay_order_id,
            razorpay_payment_id: self.razorpay_payment_id,
            plan_ids: self.plan_ids,
            plan_titles: self.plan_titles,
            total_amount: self.total_amount,
            currency: self.currency,
            payment_status: self.payment_status,
            created_at: now,
            updated_at: now,
        }
    }
}
