//! Order Aggregate
//!
//! Order construction at checkout and the payment state machine. `reconcile`
//! is pure: given the current order and a provider event it returns the field
//! changes and ledger entries to persist, and nothing when the transition has
//! already been applied.

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::loyalty::NewLoyaltyTransaction;
use crate::domain::pricing::Totals;
use crate::model::{Order, OrderStatus, PaymentStatus};
use crate::payments::PaymentEvent;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressSnapshot {
    #[validate(length(min = 1))]
    pub street: String,
    #[serde(default)]
    pub house_number: String,
    #[validate(length(min = 1))]
    pub postal_code: String,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 2))]
    pub country: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerSnapshot {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

/// A line priced from the live catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_sku: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
}

impl NewOrderItem {
    pub fn total(&self) -> Decimal { self.price * Decimal::from(self.quantity) }
}

/// Everything `Store::place_order` writes in one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub customer: CustomerSnapshot,
    pub shipping: AddressSnapshot,
    pub billing: AddressSnapshot,
    pub totals: Totals,
    pub loyalty_points_earned: i64,
    pub notes: Option<String>,
    pub is_b2b: bool,
    pub items: Vec<NewOrderItem>,
}

pub fn next_order_number() -> String { format!("ORD-{:08}", rand::random::<u32>() % 100_000_000) }

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_intent_id: Option<String>,
}

impl OrderUpdate {
    pub fn apply_to(&self, order: &mut Order) {
        if let Some(status) = self.status { order.status = status; }
        if let Some(payment_status) = self.payment_status { order.payment_status = payment_status; }
        if let Some(pi) = &self.payment_intent_id { order.payment_intent_id = Some(pi.clone()); }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition { Paid, Cancelled, PaymentFailed, Refunded }

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub update: Option<OrderUpdate>,
    pub ledger: Vec<NewLoyaltyTransaction>,
    pub transition: Option<Transition>,
}

impl Reconciliation {
    pub fn unchanged() -> Self { Self::default() }
    pub fn is_noop(&self) -> bool { self.update.is_none() && self.ledger.is_empty() }
}

impl Order {
    pub fn is_guest(&self) -> bool { self.user_id.is_none() }

    pub fn reconcile(&self, event: &PaymentEvent) -> Reconciliation {
        match event {
            PaymentEvent::CheckoutCompleted { payment_intent, .. } => {
                if matches!(self.payment_status, PaymentStatus::Paid | PaymentStatus::Refunded) {
                    return Reconciliation::unchanged();
                }
                let ledger = match self.user_id {
                    Some(user_id) if self.loyalty_points_earned > 0 => vec![NewLoyaltyTransaction::earned(
                        user_id,
                        Some(self.id),
                        self.loyalty_points_earned,
                        format!("Points earned for order {}", self.order_number),
                    )],
                    _ => vec![],
                };
                Reconciliation {
                    update: Some(OrderUpdate { status: Some(OrderStatus::Paid), payment_status: Some(PaymentStatus::Paid), payment_intent_id: payment_intent.clone() }),
                    ledger,
                    transition: Some(Transition::Paid),
                }
            }
            PaymentEvent::CheckoutExpired { .. } => {
                let already = self.status == OrderStatus::Cancelled && self.payment_status == PaymentStatus::Failed;
                if already || matches!(self.payment_status, PaymentStatus::Paid | PaymentStatus::Refunded) {
                    return Reconciliation::unchanged();
                }
                Reconciliation {
                    update: Some(OrderUpdate { status: Some(OrderStatus::Cancelled), payment_status: Some(PaymentStatus::Failed), payment_intent_id: None }),
                    ledger: vec![],
                    transition: Some(Transition::Cancelled),
                }
            }
            PaymentEvent::PaymentFailed { .. } => {
                if self.payment_status != PaymentStatus::Pending {
                    return Reconciliation::unchanged();
                }
                Reconciliation {
                    update: Some(OrderUpdate { payment_status: Some(PaymentStatus::Failed), ..OrderUpdate::default() }),
                    ledger: vec![],
                    transition: Some(Transition::PaymentFailed),
                }
            }
            PaymentEvent::ChargeRefunded { .. } => {
                if self.payment_status == PaymentStatus::Refunded {
                    return Reconciliation::unchanged();
                }
                // Only reverse points that were actually granted on payment.
                let ledger = match self.user_id {
                    Some(user_id) if self.payment_status == PaymentStatus::Paid && self.loyalty_points_earned > 0 => {
                        vec![NewLoyaltyTransaction::adjusted(
                            user_id,
                            Some(self.id),
                            -self.loyalty_points_earned,
                            format!("Points reversed for refund of order {}", self.order_number),
                        )]
                    }
                    _ => vec![],
                };
                Reconciliation {
                    update: Some(OrderUpdate { status: Some(OrderStatus::Refunded), payment_status: Some(PaymentStatus::Refunded), payment_intent_id: None }),
                    ledger,
                    transition: Some(Transition::Refunded),
                }
            }
            PaymentEvent::Unhandled => Reconciliation::unchanged(),
        }
    }
}
