//! Checkout and reconciliation backend for the DownDating storefront.

pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
pub mod storefront;

pub use startup::{AppState, Application};
