pub mod application;
pub mod invoice;
pub mod plan;
pub mod transaction;

pub use application::{ApplicationFilter, ApplicationStatus, PlanApplication};
pub use invoice::{format_invoice_number, invoice_month, Invoice};
pub use plan::{FormUrl, Plan};
pub use transaction::{
    normalize_email, CustomerInfo, NewTransaction, PaymentStatus, TransactionRecord,
};
