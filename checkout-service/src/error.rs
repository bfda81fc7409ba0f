//! Domain errors for the checkout flow and their HTTP mapping.

use service_core::error::AppError;
use thiserror::Error;

use crate::services::email::EmailError;
use crate::services::razorpay::GatewayError;
use crate::services::storage::StorageError;
use crate::services::store::StoreError;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid plan id: {0}")]
    InvalidPlan(String),

    #[error("Amount mismatch: declared {declared}, expected {expected}")]
    AmountMismatch { declared: u64, expected: u64 },

    #[error("Invalid coupon code: {0}")]
    InvalidCoupon(String),

    #[error("Payment signature verification failed")]
    InvalidSignature,

    #[error("Order {0} has already been recorded")]
    DuplicateOrder(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Storage upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Email delivery failed: {0}")]
    Email(#[from] EmailError),

    #[error(transparent)]
    Store(StoreError),

    /// The transaction row could not be written; the customer has to quote
    /// the order id to support.
    #[error("Failed to record payment for order {order_id}")]
    RecordFailed { order_id: String },
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(key) => CheckoutError::DuplicateOrder(key),
            StoreError::NotFound(what) => CheckoutError::NotFound(what),
            StoreError::InvalidTransition { from, to } => CheckoutError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            other => CheckoutError::Store(other),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Validation(errors) => AppError::ValidationError(errors),
            CheckoutError::InvalidRequest(_)
            | CheckoutError::InvalidPlan(_)
            | CheckoutError::AmountMismatch { .. }
            | CheckoutError::InvalidCoupon(_) => AppError::BadRequest(anyhow::Error::new(err)),
            CheckoutError::InvalidSignature => AppError::Unauthorized(anyhow::Error::new(err)),
            CheckoutError::DuplicateOrder(_) | CheckoutError::InvalidTransition { .. } => {
                AppError::Conflict(anyhow::Error::new(err))
            }
            CheckoutError::NotFound(_) => AppError::NotFound(anyhow::Error::new(err)),
            CheckoutError::Gateway(_) | CheckoutError::Storage(_) => {
                AppError::BadGateway(err.to_string())
            }
            CheckoutError::Email(e) => AppError::EmailError(e.to_string()),
            CheckoutError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            CheckoutError::RecordFailed { order_id } => AppError::ContactSupport(format!(
                "We could not record your payment. Please contact support with order id {}",
                order_id
            )),
        }
    }
}
