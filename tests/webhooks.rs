mod common;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use common::{checkout_body, payment_failed_event, refund_event, session_event, TestApp};
use storefront::model::{LoyaltyKind, Order, OrderStatus, PaymentStatus, Role};
use storefront::store::Store;

/// A registered order worth `floor(subtotal)` = 40 points.
async fn registered_order(app: &TestApp) -> (Order, Uuid) {
    let (user, token) = app.user(Role::Consumer, 0).await;
    let kettle = app.product("Kettle", "40.00", 10).await;
    let (status, body) = app.call(Method::POST, "/api/checkout", Some(&token), Some(checkout_body(&[(kettle.id, 1)]))).await;
    assert_eq!(status, StatusCode::OK);
    let id: Uuid = body["orderId"].as_str().unwrap().parse().unwrap();
    (app.store.order(id).await.unwrap().unwrap(), user.id)
}

async fn reload(app: &TestApp, id: Uuid) -> Order {
    app.store.order(id).await.unwrap().unwrap()
}

#[tokio::test]
async fn completed_session_marks_paid_and_grants_points() {
    let app = TestApp::new();
    let (order, user_id) = registered_order(&app).await;
    assert_eq!(order.loyalty_points_earned, 40);

    let (status, body) = app.webhook(session_event("evt_1", "checkout.session.completed", order.id, "pi_1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));

    let order = reload(&app, order.id).await;
    assert_eq!((order.status, order.payment_status), (OrderStatus::Paid, PaymentStatus::Paid));
    assert_eq!(order.payment_intent_id.as_deref(), Some("pi_1"));
    assert_eq!(app.balance_of(user_id).await, 40);

    let history = app.store.loyalty_history(user_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!((history[0].kind, history[0].points, history[0].order_id), (LoyaltyKind::Earned, 40, Some(order.id)));
}

#[tokio::test]
async fn redelivered_completion_grants_points_once() {
    let app = TestApp::new();
    let (order, user_id) = registered_order(&app).await;
    let event = session_event("evt_1", "checkout.session.completed", order.id, "pi_1");

    for _ in 0..3 {
        let (status, _) = app.webhook(event.clone()).await;
        assert_eq!(status, StatusCode::OK);
    }
    // same transition under a fresh event id is also a no-op
    let (status, _) = app.webhook(session_event("evt_2", "checkout.session.completed", order.id, "pi_1")).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.store.ledger_len().await, 1);
    assert_eq!(app.balance_of(user_id).await, 40);
}

#[tokio::test]
async fn refund_reverses_granted_points() {
    let app = TestApp::new();
    let (order, user_id) = registered_order(&app).await;
    app.webhook(session_event("evt_1", "checkout.session.completed", order.id, "pi_1")).await;

    let (status, _) = app.webhook(refund_event("evt_2", "pi_1")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.webhook(refund_event("evt_3", "pi_1")).await;
    assert_eq!(status, StatusCode::OK);

    let order = reload(&app, order.id).await;
    assert_eq!((order.status, order.payment_status), (OrderStatus::Refunded, PaymentStatus::Refunded));
    assert_eq!(app.balance_of(user_id).await, 0);

    let history = app.store.loyalty_history(user_id).await.unwrap();
    assert_eq!(history.len(), 2);
    let reversal = history.iter().find(|t| t.kind == LoyaltyKind::Adjusted).unwrap();
    assert_eq!(reversal.points, -40);
}

#[tokio::test]
async fn guest_orders_never_touch_the_ledger() {
    let app = TestApp::new();
    let vase = app.product("Vase", "30.00", 3).await;
    let (_, body) = app.call(Method::POST, "/api/checkout", None, Some(checkout_body(&[(vase.id, 1)]))).await;
    let id: Uuid = body["orderId"].as_str().unwrap().parse().unwrap();

    app.webhook(session_event("evt_1", "checkout.session.completed", id, "pi_guest")).await;
    app.webhook(refund_event("evt_2", "pi_guest")).await;

    assert_eq!(reload(&app, id).await.status, OrderStatus::Refunded);
    assert_eq!(app.store.ledger_len().await, 0);
}

#[tokio::test]
async fn expired_session_cancels_the_order() {
    let app = TestApp::new();
    let (order, user_id) = registered_order(&app).await;

    let (status, _) = app.webhook(session_event("evt_1", "checkout.session.expired", order.id, "pi_1")).await;
    assert_eq!(status, StatusCode::OK);

    let order = reload(&app, order.id).await;
    assert_eq!((order.status, order.payment_status), (OrderStatus::Cancelled, PaymentStatus::Failed));
    assert_eq!(app.balance_of(user_id).await, 0);
}

#[tokio::test]
async fn failed_payment_for_unknown_intent_is_acknowledged() {
    let app = TestApp::new();
    let (order, _) = registered_order(&app).await;

    let (status, body) = app.webhook(payment_failed_event("evt_1", "pi_nobody")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);

    let after = reload(&app, order.id).await;
    assert_eq!((after.status, after.payment_status), (OrderStatus::Pending, PaymentStatus::Pending));
    assert_eq!(after.updated_at, order.updated_at);
}

#[tokio::test]
async fn failed_payment_marks_known_intent() {
    let app = TestApp::new();
    let (order, _) = registered_order(&app).await;
    // a completed session stores the intent; a later failure on it after payment changes nothing
    app.webhook(session_event("evt_1", "checkout.session.completed", order.id, "pi_1")).await;
    app.webhook(payment_failed_event("evt_2", "pi_1")).await;
    assert_eq!(reload(&app, order.id).await.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn unhandled_event_types_are_acknowledged() {
    let app = TestApp::new();
    let (status, body) = app.webhook(json!({ "id": "evt_x", "type": "customer.created", "data": { "object": {} } })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
}

#[tokio::test]
async fn bad_signature_is_rejected_without_mutation() {
    let app = TestApp::new();
    let (order, _) = registered_order(&app).await;
    let payload = session_event("evt_1", "checkout.session.completed", order.id, "pi_1").to_string();

    let forged = format!("t={},v1={}", Utc::now().timestamp(), "00".repeat(32));
    let (status, body) = app.webhook_with_header(payload.clone(), Some(forged)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = app.webhook_with_header(payload, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let order = reload(&app, order.id).await;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(app.store.ledger_len().await, 0);
}
