//! Storefront
//!
//! Multi-tenant storefront backend for admin, employee, b2b, consumer and
//! guest shoppers.
//!
//! ## Features
//! - Product catalog with images, categories and stock
//! - Cart with derived totals and scoped persistence
//! - Checkout with atomic stock decrement and hosted payment sessions
//! - Idempotent payment webhook reconciliation
//! - Loyalty ledger (earn, redeem, reversal)
//! - Role-gated admin, employee, b2b and consumer dashboards

use thiserror::Error;
use uuid::Uuid;

pub mod api;
pub mod config;
pub mod domain;
pub mod model;
pub mod payments;
pub mod services;
pub mod state;
pub mod store;

pub use config::AppConfig;
pub use state::AppState;

use domain::aggregates::{CartError, ProductError};
use payments::PaymentError;
use store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("{0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Insufficient stock for product {0}")]
    InsufficientStock(Uuid),

    #[error("Insufficient points")]
    InsufficientPoints,

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid webhook: {0}")]
    InvalidWebhook(String),

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Payment error: {0}")]
    Payment(PaymentError),
}

impl From<StoreError> for StorefrontError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownProduct(id) => Self::Validation(format!("Unknown product {id}")),
            StoreError::UnknownProfile(_) => Self::NotFound("Profile"),
            StoreError::InsufficientStock(id) => Self::InsufficientStock(id),
            StoreError::InsufficientPoints => Self::InsufficientPoints,
            StoreError::Conflict(what) => Self::Conflict(format!("{what} already exists")),
            StoreError::OutOfRange(what) => Self::Validation(format!("Value out of range ({what})")),
            other => Self::Store(other),
        }
    }
}

impl From<PaymentError> for StorefrontError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::InvalidSignature | PaymentError::InvalidPayload(_) => Self::InvalidWebhook(e.to_string()),
            other => Self::Payment(other),
        }
    }
}

impl From<ProductError> for StorefrontError {
    fn from(e: ProductError) -> Self { Self::Validation(e.to_string()) }
}

impl From<CartError> for StorefrontError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound(_) => Self::NotFound("Cart item"),
            CartError::QuantityTooLarge(_) => Self::Validation(e.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for StorefrontError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
