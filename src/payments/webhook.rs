//! Provider webhook payloads, decoded into a tagged union keyed by event type.

use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::PaymentError;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const CHECKOUT_EXPIRED: &str = "checkout.session.expired";
pub const PAYMENT_FAILED: &str = "payment_intent.payment_failed";
pub const CHARGE_REFUNDED: &str = "charge.refunded";

/// Metadata key carrying our order id on sessions and payment intents.
pub const ORDER_ID_KEY: &str = "orderId";
pub const ORDER_NUMBER_KEY: &str = "orderNumber";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    CheckoutCompleted { session_id: String, order_id: Option<Uuid>, order_number: Option<String>, payment_intent: Option<String> },
    CheckoutExpired { session_id: String, order_id: Option<Uuid> },
    PaymentFailed { payment_intent: String, order_id: Option<Uuid> },
    ChargeRefunded { charge_id: String, payment_intent: Option<String> },
    Unhandled,
}

/// A verified delivery: provider event id, raw type and decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: String,
    pub kind: String,
    pub event: PaymentEvent,
}

#[derive(Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct SessionObject {
    id: String,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    payment_intent: Option<String>,
}

#[derive(Deserialize)]
struct PaymentIntentObject {
    id: String,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
struct ChargeObject {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
}

fn order_id(metadata: &Option<HashMap<String, String>>) -> Option<Uuid> {
    metadata.as_ref()?.get(ORDER_ID_KEY)?.parse().ok()
}

fn object<T: for<'de> Deserialize<'de>>(value: serde_json::Value) -> Result<T, PaymentError> {
    serde_json::from_value(value).map_err(|e| PaymentError::InvalidPayload(e.to_string()))
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, PaymentError> {
        let envelope: Envelope = serde_json::from_slice(payload).map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;
        let event = match envelope.kind.as_str() {
            CHECKOUT_COMPLETED => {
                let s: SessionObject = object(envelope.data.object)?;
                PaymentEvent::CheckoutCompleted {
                    order_id: order_id(&s.metadata),
                    order_number: s.metadata.as_ref().and_then(|m| m.get(ORDER_NUMBER_KEY).cloned()),
                    session_id: s.id,
                    payment_intent: s.payment_intent,
                }
            }
            CHECKOUT_EXPIRED => {
                let s: SessionObject = object(envelope.data.object)?;
                PaymentEvent::CheckoutExpired { order_id: order_id(&s.metadata), session_id: s.id }
            }
            PAYMENT_FAILED => {
                let pi: PaymentIntentObject = object(envelope.data.object)?;
                PaymentEvent::PaymentFailed { order_id: order_id(&pi.metadata), payment_intent: pi.id }
            }
            CHARGE_REFUNDED => {
                let c: ChargeObject = object(envelope.data.object)?;
                PaymentEvent::ChargeRefunded { charge_id: c.id, payment_intent: c.payment_intent }
            }
            _ => PaymentEvent::Unhandled,
        };
        Ok(Self { id: envelope.id, kind: envelope.kind, event })
    }
}
