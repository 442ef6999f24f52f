//! Domain events
//!
//! Published best-effort on NATS when a bus is configured; a publication
//! failure never fails the request that raised the event.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::model::OrderStatus;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Product(ProductEvent),
    Loyalty(LoyaltyEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, order_number: String, user_id: Option<Uuid>, total: Decimal },
    Paid { order_id: Uuid, order_number: String },
    Cancelled { order_id: Uuid, order_number: String },
    Refunded { order_id: Uuid, order_number: String },
    StatusChanged { order_id: Uuid, order_number: String, status: OrderStatus },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    StockChanged { product_id: Uuid, stock_quantity: i32 },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoyaltyEvent {
    Redeemed { user_id: Uuid, reward_id: Uuid, points: i64 },
}

impl DomainEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            DomainEvent::Order(OrderEvent::Created { .. }) => "storefront.order.created",
            DomainEvent::Order(OrderEvent::Paid { .. }) => "storefront.order.paid",
            DomainEvent::Order(OrderEvent::Cancelled { .. }) => "storefront.order.cancelled",
            DomainEvent::Order(OrderEvent::Refunded { .. }) => "storefront.order.refunded",
            DomainEvent::Order(OrderEvent::StatusChanged { .. }) => "storefront.order.status_changed",
            DomainEvent::Product(ProductEvent::StockChanged { .. }) => "storefront.product.stock_changed",
            DomainEvent::Loyalty(LoyaltyEvent::Redeemed { .. }) => "storefront.loyalty.redeemed",
        }
    }
}

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }
    pub fn disabled() -> Self { Self::default() }

    pub async fn publish(&self, event: DomainEvent) {
        let Some(client) = &self.nats else { return };
        let subject = event.subject();
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => { tracing::warn!(subject, error = %e, "failed to encode domain event"); return; }
        };
        if let Err(e) = client.publish(subject.to_string(), payload.into()).await {
            tracing::warn!(subject, error = %e, "failed to publish domain event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_encoding() {
        let event = DomainEvent::Order(OrderEvent::Paid { order_id: Uuid::nil(), order_number: "ORD-1".into() });
        assert_eq!(event.subject(), "storefront.order.paid");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "order");
        assert_eq!(json["event"], "paid");
        assert_eq!(json["order_number"], "ORD-1");
    }

    #[tokio::test]
    async fn test_disabled_publisher_is_silent() {
        EventPublisher::disabled()
            .publish(DomainEvent::Product(ProductEvent::StockChanged { product_id: Uuid::nil(), stock_quantity: 3 }))
            .await;
    }
}
