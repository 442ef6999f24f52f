//! Multi-step operations behind the HTTP handlers.

pub mod checkout;
pub mod loyalty;
pub mod webhooks;
