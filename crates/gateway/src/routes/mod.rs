//! HTTP handlers.

pub mod checkout;
pub mod ops;
pub mod sagas;
