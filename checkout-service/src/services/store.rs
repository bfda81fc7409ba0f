//! Persistence seams for the checkout flow.
//!
//! `MongoRepository` is the production implementation; `MemoryStore` backs
//! tests and local development.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    ApplicationFilter, Invoice, NewTransaction, PaymentStatus, Plan, PlanApplication,
    TransactionRecord,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key (gateway order id, invoice number) already exists.
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Backend(anyhow::Error::new(err))
    }
}

impl From<mongodb::bson::ser::Error> for StoreError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        StoreError::Backend(anyhow::Error::new(err))
    }
}

/// Read-only access to the plan catalog.
#[async_trait]
pub trait PlanCatalog: Send + Sync {
    /// All plans, ordered by id.
    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError>;

    async fn get_plan(&self, id: &str) -> Result<Option<Plan>, StoreError>;

    /// Plans whose id is in `ids`; unknown ids are skipped.
    async fn plans_by_ids(&self, ids: &[String]) -> Result<Vec<Plan>, StoreError>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert one record. Fails with [`StoreError::Duplicate`] when the
    /// gateway order id was already recorded.
    async fn record_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionRecord, StoreError>;

    async fn transaction_by_order(
        &self,
        order_id: &str,
    ) -> Result<Option<TransactionRecord>, StoreError>;

    /// Move a record to `status`. Re-applying the current status is a no-op;
    /// leaving a settled status is [`StoreError::InvalidTransition`].
    async fn update_transaction_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
    ) -> Result<TransactionRecord, StoreError>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Atomically reserve the next sequence number for `month` (`YYYYMM`).
    /// The first reservation in a month returns 1.
    async fn reserve_invoice_sequence(&self, month: &str) -> Result<u32, StoreError>;

    /// Insert an invoice. Fails with [`StoreError::Duplicate`] when the
    /// invoice number is taken.
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError>;

    async fn get_invoice(&self, invoice_number: &str) -> Result<Option<Invoice>, StoreError>;

    /// Invoices for a customer, newest first.
    async fn invoices_by_email(&self, email: &str) -> Result<Vec<Invoice>, StoreError>;
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn insert_application(&self, application: &PlanApplication) -> Result<(), StoreError>;

    /// Applications matching the filter, newest first.
    async fn list_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<PlanApplication>, StoreError>;
}

/// Everything the checkout service persists, behind one handle.
#[async_trait]
pub trait CheckoutStore: PlanCatalog + TransactionStore + InvoiceStore + ApplicationStore {
    async fn health_check(&self) -> Result<(), StoreError>;
}
