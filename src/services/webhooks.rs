//! Payment webhook reconciliation.

use crate::domain::aggregates::Transition;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::model::Order;
use crate::payments::{verify_signature, PaymentEvent, WebhookEvent};
use crate::store::EventOutcome;
use crate::{AppState, Result, StorefrontError};

async fn locate_order(state: &AppState, event: &PaymentEvent) -> Result<Option<Order>> {
    let order = match event {
        PaymentEvent::CheckoutCompleted { order_id, .. } | PaymentEvent::CheckoutExpired { order_id, .. } => match order_id {
            Some(id) => state.store.order(*id).await?,
            None => None,
        },
        PaymentEvent::PaymentFailed { payment_intent, order_id } => match state.store.order_by_payment_intent(payment_intent).await? {
            Some(order) => Some(order),
            None => match order_id {
                Some(id) => state.store.order(*id).await?,
                None => None,
            },
        },
        PaymentEvent::ChargeRefunded { payment_intent: Some(pi), .. } => state.store.order_by_payment_intent(pi).await?,
        PaymentEvent::ChargeRefunded { payment_intent: None, .. } | PaymentEvent::Unhandled => None,
    };
    Ok(order)
}

fn transition_event(order: &Order, transition: Transition) -> Option<DomainEvent> {
    let (order_id, order_number) = (order.id, order.order_number.clone());
    match transition {
        Transition::Paid => Some(DomainEvent::Order(OrderEvent::Paid { order_id, order_number })),
        Transition::Cancelled => Some(DomainEvent::Order(OrderEvent::Cancelled { order_id, order_number })),
        Transition::Refunded => Some(DomainEvent::Order(OrderEvent::Refunded { order_id, order_number })),
        Transition::PaymentFailed => None,
    }
}

/// Verifies, decodes and applies one delivery. Unknown orders and already
/// processed events are acknowledged without mutation; storage failures
/// surface so the provider retries.
#[tracing::instrument(skip_all)]
pub async fn handle_delivery(state: &AppState, payload: &[u8], signature: Option<&str>) -> Result<()> {
    let Some(secret) = state.config.stripe_webhook_secret.as_deref() else {
        tracing::error!("webhook secret is not configured; rejecting delivery");
        return Err(StorefrontError::InvalidWebhook("endpoint is not configured".into()));
    };
    let signature = signature.ok_or_else(|| StorefrontError::InvalidWebhook("missing signature".into()))?;
    verify_signature(payload, signature, secret).map_err(|e| {
        tracing::warn!("webhook signature verification failed");
        StorefrontError::from(e)
    })?;

    let event = WebhookEvent::parse(payload)?;
    let (event_id, event_type) = (event.id.as_str(), event.kind.as_str());

    if event.event == PaymentEvent::Unhandled {
        tracing::info!(event_id, event_type, "ignoring unhandled event type");
        return Ok(());
    }

    let Some(order) = locate_order(state, &event.event).await? else {
        tracing::info!(event_id, event_type, "no order matches event");
        return Ok(());
    };

    match state.store.apply_payment_event(&event, order.id).await? {
        EventOutcome::Duplicate => tracing::info!(event_id, event_type, order_id = %order.id, "event already processed"),
        EventOutcome::OrderMissing => tracing::info!(event_id, event_type, order_id = %order.id, "order vanished before event applied"),
        EventOutcome::Applied { order, reconciliation } if reconciliation.is_noop() => {
            tracing::info!(event_id, event_type, order_id = %order.id, "transition already applied");
        }
        EventOutcome::Applied { order, reconciliation } => {
            tracing::info!(
                event_id, event_type,
                order_id = %order.id,
                status = %order.status,
                ledger_entries = reconciliation.ledger.len(),
                "order reconciled",
            );
            if let Some(event) = reconciliation.transition.and_then(|t| transition_event(&order, t)) {
                state.events.publish(event).await;
            }
        }
    }
    Ok(())
}
