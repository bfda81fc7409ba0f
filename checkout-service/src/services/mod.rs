pub mod applications;
pub mod checkout;
pub mod coupons;
pub mod email;
pub mod invoice;
pub mod memory;
pub mod metrics;
pub mod pricing;
pub mod razorpay;
pub mod repository;
pub mod storage;
pub mod store;
pub mod template;

pub use applications::{ApplicationService, ApplicationSubmission};
pub use checkout::{CheckoutService, ConfirmRequest, Confirmation, OrderRef, OrderRequest};
pub use coupons::{AppliedCoupon, Coupon, CouponBook};
pub use email::{EmailProvider, MockEmailProvider, SendGridProvider, SmtpProvider};
pub use invoice::{InvoiceBatch, InvoiceDispatcher};
pub use memory::{MemoryObjectStorage, MemoryStore};
pub use razorpay::{PaymentGateway, RazorpayClient, RazorpaySignatures};
pub use repository::MongoRepository;
pub use storage::{HttpObjectStorage, ObjectStorage};
pub use store::{CheckoutStore, StoreError};
