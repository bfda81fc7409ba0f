//! Storefront-side pieces: the persisted cart and the HTTP client the UI
//! uses to check out.

pub mod cart;
pub mod client;

pub use cart::{
    CartError, CartItem, CartState, CartStorage, CartStore, FileCartStorage, MemoryCartStorage,
    CART_STORAGE_KEY,
};
pub use client::{CheckoutReceipt, ClientError, OrderTicket, PaymentCallback, StorefrontClient};
