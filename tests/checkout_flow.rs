mod common;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use common::{checkout_body, dec, FakeProvider, TestApp};
use storefront::domain::aggregates::ProductRequest;
use storefront::model::{OrderStatus, PaymentStatus, Role};
use storefront::services::checkout::BANK_TRANSFER_MESSAGE;
use storefront::store::{OrderFilter, Store};

fn order_id(body: &serde_json::Value) -> Uuid {
    body["orderId"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn empty_checkout_is_rejected_without_writing() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::POST, "/api/checkout", None, Some(checkout_body(&[]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn malformed_checkout_body_is_a_bad_request() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::POST, "/api/checkout", None, Some(json!({ "items": "nope" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn guest_checkout_snapshots_email_and_earns_nothing() {
    let app = TestApp::new();
    let mug = app.product("Enamel Mug", "15.00", 10).await;

    let (status, body) = app.call(Method::POST, "/api/checkout", None, Some(checkout_body(&[(mug.id, 2)]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["orderNumber"].as_str().unwrap().starts_with("ORD-"));
    assert!(body.get("checkoutUrl").is_none());

    let order = app.store.order(order_id(&body)).await.unwrap().unwrap();
    assert_eq!(order.user_id, None);
    assert_eq!(order.guest_email.as_deref(), Some("jane@example.com"));
    assert_eq!(order.loyalty_points_earned, 0);
    assert_eq!(order.subtotal, Decimal::new(3000, 2));
    assert_eq!(order.tax, Decimal::new(630, 2));
    assert_eq!(order.shipping_cost, Decimal::new(495, 2));
    assert_eq!(order.total, Decimal::new(4125, 2));
    assert_eq!(order.billing_city, "Amsterdam");
    assert_eq!((order.status, order.payment_status), (OrderStatus::Pending, PaymentStatus::Pending));
    assert_eq!(app.stock_of(mug.id).await, 8);

    let items = app.store.order_items(order.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_name, "Enamel Mug");
    assert_eq!(items[0].total, Decimal::new(3000, 2));
}

#[tokio::test]
async fn submitted_prices_are_not_trusted() {
    let app = TestApp::new();
    let lamp = app.product("Desk Lamp", "80.00", 3).await;
    let mut body = checkout_body(&[(lamp.id, 1)]);
    body["items"][0]["price"] = json!("0.01");
    body["subtotal"] = json!("0.01");
    body["total"] = json!("0.01");

    let (status, resp) = app.call(Method::POST, "/api/checkout", None, Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let order = app.store.order(order_id(&resp)).await.unwrap().unwrap();
    assert_eq!(order.subtotal, Decimal::new(8000, 2));
    assert_eq!(order.shipping_cost, Decimal::ZERO);
    assert_eq!(order.total, Decimal::new(9680, 2));
}

#[tokio::test]
async fn registered_checkout_earns_floor_of_subtotal() {
    let app = TestApp::new();
    let (user, token) = app.user(Role::Consumer, 0).await;
    let tea = app.product("Loose Leaf Tea", "10.75", 5).await;
    let mut body = checkout_body(&[(tea.id, 2)]);
    body["isGuest"] = json!(false);
    body["userId"] = json!(user.id);

    let (status, resp) = app.call(Method::POST, "/api/checkout", Some(&token), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let order = app.store.order(order_id(&resp)).await.unwrap().unwrap();
    assert_eq!(order.user_id, Some(user.id));
    assert_eq!(order.guest_email, None);
    assert_eq!(order.loyalty_points_earned, 21);
    assert!(!order.is_b2b);
}

#[tokio::test]
async fn b2b_checkout_is_flagged() {
    let app = TestApp::new();
    let (_, token) = app.user(Role::B2b, 0).await;
    let crate_of_paper = app.product("Copy Paper Box", "30.00", 50).await;
    let (status, resp) = app.call(Method::POST, "/api/checkout", Some(&token), Some(checkout_body(&[(crate_of_paper.id, 3)]))).await;
    assert_eq!(status, StatusCode::OK);
    let order = app.store.order(order_id(&resp)).await.unwrap().unwrap();
    assert!(order.is_b2b);
    assert_eq!(order.loyalty_points_earned, 90);
}

#[tokio::test]
async fn signed_in_caller_can_still_check_out_as_guest() {
    let app = TestApp::new();
    let (user, token) = app.user(Role::Consumer, 0).await;
    let scarf = app.product("Silk Scarf", "60.00", 4).await;
    let mut body = checkout_body(&[(scarf.id, 1)]);
    body["isGuest"] = json!(true);

    let (status, resp) = app.call(Method::POST, "/api/checkout", Some(&token), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let order = app.store.order(order_id(&resp)).await.unwrap().unwrap();
    assert_eq!(order.user_id, None);
    assert_eq!(order.guest_email.as_deref(), Some("jane@example.com"));
    assert_eq!(order.loyalty_points_earned, 0);
    let mine = OrderFilter { user_id: Some(user.id), ..Default::default() };
    assert!(app.store.list_orders(&mine).await.unwrap().data.is_empty());
}

#[tokio::test]
async fn oversized_quantities_are_rejected_before_touching_stock() {
    let app = TestApp::new();
    let bolt = app.product("Bolt", "0.10", 100).await;

    // two lines that only overflow once summed
    let (status, body) = app.call(Method::POST, "/api/checkout", None, Some(checkout_body(&[(bolt.id, 2_000_000_000), (bolt.id, 2_000_000_000)]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = app.call(Method::POST, "/api/checkout", None, Some(checkout_body(&[(bolt.id, 6_000), (bolt.id, 6_000)]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.stock_of(bolt.id).await, 100);
    assert_eq!(app.store.order_count().await, 0);

    // repeated lines within the cap merge into one order line
    let (status, resp) = app.call(Method::POST, "/api/checkout", None, Some(checkout_body(&[(bolt.id, 30), (bolt.id, 20)]))).await;
    assert_eq!(status, StatusCode::OK);
    let items = app.store.order_items(order_id(&resp)).await.unwrap();
    assert_eq!((items.len(), items[0].quantity), (1, 50));
    assert_eq!(app.stock_of(bolt.id).await, 50);
}

#[tokio::test]
async fn order_total_beyond_storable_amount_is_a_bad_request() {
    let app = TestApp::new();
    let yacht = app.product("Yacht", "9999999999.00", 10).await;
    let (status, body) = app.call(Method::POST, "/api/checkout", None, Some(checkout_body(&[(yacht.id, 2)]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("total"));
    assert_eq!(app.stock_of(yacht.id).await, 10);
}

#[tokio::test]
async fn caller_cannot_order_for_someone_else() {
    let app = TestApp::new();
    let (_, token) = app.user(Role::Consumer, 0).await;
    let pen = app.product("Fountain Pen", "25.00", 5).await;
    let mut body = checkout_body(&[(pen.id, 1)]);
    body["isGuest"] = json!(false);
    body["userId"] = json!(Uuid::new_v4());

    let (status, _) = app.call(Method::POST, "/api/checkout", Some(&token), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::POST, "/api/checkout", None, Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn failed_item_insert_leaves_no_order_behind() {
    let app = TestApp::new();
    let chair = app.product("Folding Chair", "45.00", 4).await;
    app.store.fail_next_item_insert();

    let (status, body) = app.call(Method::POST, "/api/checkout", None, Some(checkout_body(&[(chair.id, 1)]))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Something went wrong while processing your request");
    assert_eq!(app.store.order_count().await, 0);
    assert_eq!(app.stock_of(chair.id).await, 4);
}

#[tokio::test]
async fn insufficient_stock_rejects_the_whole_order() {
    let app = TestApp::new();
    let plenty = app.product("Notebook", "5.00", 100).await;
    let scarce = app.product("Limited Print", "120.00", 1).await;

    let (status, _) = app.call(Method::POST, "/api/checkout", None, Some(checkout_body(&[(plenty.id, 3), (scarce.id, 2)]))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.store.order_count().await, 0);
    assert_eq!(app.stock_of(plenty.id).await, 100);
    assert_eq!(app.stock_of(scarce.id).await, 1);
}

#[tokio::test]
async fn unknown_product_is_a_bad_request() {
    let app = TestApp::new();
    let (status, _) = app.call(Method::POST, "/api/checkout", None, Some(checkout_body(&[(Uuid::new_v4(), 1)]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payment_session_is_opened_and_attached() {
    let provider = Arc::new(FakeProvider::default());
    let app = TestApp::with_provider(provider.clone());
    let candle = app.product("Soy Candle", "12.50", 10).await;

    let (status, body) = app.call(Method::POST, "/api/checkout", None, Some(checkout_body(&[(candle.id, 2)]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checkoutUrl"], "https://pay.example/cs_test_1");

    let order = app.store.order(order_id(&body)).await.unwrap().unwrap();
    assert_eq!(order.payment_session_id.as_deref(), Some("cs_test_1"));

    let requests = provider.requests.lock().unwrap();
    let lines: Vec<(&str, i64, i64)> = requests[0].lines.iter().map(|l| (l.name.as_str(), l.unit_amount, l.quantity)).collect();
    assert_eq!(lines, vec![("Soy Candle", 1250, 2), ("Shipping", 495, 1), ("VAT (21%)", 525, 1)]);
    assert_eq!(requests[0].amount_total(), 3520);
    assert!(requests[0].success_url.contains(&format!("order={}", order.order_number)));
}

#[tokio::test]
async fn provider_failure_falls_back_to_bank_transfer() {
    let app = TestApp::with_provider(Arc::new(FakeProvider::failing()));
    let rug = app.product("Wool Rug", "199.00", 2).await;

    let (status, body) = app.call(Method::POST, "/api/checkout", None, Some(checkout_body(&[(rug.id, 1)]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], BANK_TRANSFER_MESSAGE);
    assert!(body.get("checkoutUrl").is_none());

    let order = app.store.order(order_id(&body)).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_session_id, None);
}

#[tokio::test]
async fn cart_quotes_subtotal_tax_and_points() {
    let app = TestApp::new();
    let socks = app.product("Wool Socks", "10.00", 30).await;

    let (status, cart) = app.call(Method::POST, "/api/cart/visitor-1", None, Some(json!({ "productId": socks.id, "quantity": 2 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["itemCount"], 2);
    assert_eq!(dec(&cart["subtotal"]), Decimal::new(2000, 2));
    assert_eq!(dec(&cart["tax"]), Decimal::new(420, 2));
    assert_eq!(dec(&cart["total"]), Decimal::new(2420, 2));
    assert_eq!(dec(&cart["shippingCost"]), Decimal::new(495, 2));
    assert_eq!(cart["loyaltyPreview"], 20);

    let uri = format!("/api/cart/visitor-1/items/{}", socks.id);
    let (status, cart) = app.call(Method::PATCH, &uri, None, Some(json!({ "quantity": 0 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);
    assert_eq!(dec(&cart["shippingCost"]), Decimal::ZERO);

    // adding to a cart does not reserve stock
    assert_eq!(app.stock_of(socks.id).await, 30);
}

#[tokio::test]
async fn cart_rejects_quantities_past_the_line_cap() {
    let app = TestApp::new();
    let socks = app.product("Wool Socks", "10.00", 30).await;

    let (status, body) = app.call(Method::POST, "/api/cart/big", None, Some(json!({ "productId": socks.id, "quantity": 3_000_000_000_i64 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    app.call(Method::POST, "/api/cart/big", None, Some(json!({ "productId": socks.id, "quantity": 9_999 }))).await;
    let (status, _) = app.call(Method::POST, "/api/cart/big", None, Some(json!({ "productId": socks.id, "quantity": 2 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, cart) = app.call(Method::GET, "/api/cart/big", None, None).await;
    assert_eq!(cart["itemCount"], 9_999);

    let (status, _) = app.call(Method::POST, "/api/cart/quote", None, Some(json!({ "items": [{ "productId": socks.id, "quantity": 1_000_000_000_000_i64 }] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn carts_are_isolated_by_scope() {
    let app = TestApp::new();
    let socks = app.product("Wool Socks", "10.00", 30).await;
    app.call(Method::POST, "/api/cart/a", None, Some(json!({ "productId": socks.id }))).await;

    let (_, other) = app.call(Method::GET, "/api/cart/b", None, None).await;
    assert_eq!(other["itemCount"], 0);
    let (status, _) = app.call(Method::DELETE, "/api/cart/a", None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, cleared) = app.call(Method::GET, "/api/cart/a", None, None).await;
    assert_eq!(cleared["itemCount"], 0);
}

#[tokio::test]
async fn catalog_hides_inactive_products() {
    let app = TestApp::new();
    let visible = app.product("Visible", "1.00", 1).await;
    let request: ProductRequest = serde_json::from_value(json!({ "name": "Hidden", "price": "1.00", "is_active": false })).unwrap();
    let hidden = app.store.create_product(request.into_input().unwrap()).await.unwrap();

    let (status, page) = app.call(Method::GET, "/api/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["data"][0]["id"], json!(visible.id));

    let (status, _) = app.call(Method::GET, &format!("/api/products/{}", hidden.id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, product) = app.call(Method::GET, "/api/products/slug/visible", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["name"], "Visible");
}
