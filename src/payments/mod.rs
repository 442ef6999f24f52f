//! Hosted payment sessions and provider webhooks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod signature;
pub mod stripe;
pub mod webhook;

pub use signature::{verify_signature, verify_signature_at};
pub use stripe::StripeClient;
pub use webhook::{PaymentEvent, WebhookEvent};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

/// One priced line on the hosted payment page, amounts in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLine {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub order_id: Uuid,
    pub order_number: String,
    pub customer_email: String,
    pub currency: String,
    pub lines: Vec<SessionLine>,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutSessionRequest {
    pub fn amount_total(&self) -> i64 { self.lines.iter().map(|l| l.unit_amount * l.quantity).sum() }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError>;
}
