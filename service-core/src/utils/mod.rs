pub mod retry;
pub mod signature;
