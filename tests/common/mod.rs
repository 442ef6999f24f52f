#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use storefront::api::{self, auth::Claims};
use storefront::domain::aggregates::ProductRequest;
use storefront::model::{Product, Profile, Role};
use storefront::payments::signature::sign;
use storefront::payments::{CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentProvider};
use storefront::store::{MemoryStore, Store};
use storefront::{AppConfig, AppState};

pub const JWT_SECRET: &str = "integration-secret";
pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const SETUP_KEY: &str = "bootstrap-key";

/// Records session requests; fails every call when `fail` is set.
#[derive(Default)]
pub struct FakeProvider {
    pub fail: bool,
    pub requests: Mutex<Vec<CheckoutSessionRequest>>,
}

impl FakeProvider {
    pub fn failing() -> Self { Self { fail: true, ..Default::default() } }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError> {
        if self.fail {
            return Err(PaymentError::Provider("provider unavailable".into()));
        }
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let id = format!("cs_test_{}", requests.len());
        Ok(CheckoutSession { url: Some(format!("https://pay.example/{id}")), id })
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self { Self::build(None) }

    pub fn with_provider(provider: Arc<FakeProvider>) -> Self { Self::build(Some(provider)) }

    fn build(provider: Option<Arc<FakeProvider>>) -> Self {
        let mut config = AppConfig::local(JWT_SECRET);
        config.stripe_webhook_secret = Some(WEBHOOK_SECRET.into());
        config.setup_secret_key = Some(SETUP_KEY.into());
        let store = Arc::new(MemoryStore::new());
        let mut state = AppState::new(config, store.clone() as Arc<dyn Store>);
        if let Some(provider) = provider {
            state = state.with_payments(provider);
        }
        Self { store, state }
    }

    pub fn router(&self) -> Router { api::router(self.state.clone()) }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send(request.unwrap()).await
    }

    /// Delivers a correctly signed webhook.
    pub async fn webhook(&self, event: Value) -> (StatusCode, Value) {
        let payload = event.to_string();
        let ts = Utc::now().timestamp();
        let signature = sign(payload.as_bytes(), ts, WEBHOOK_SECRET).unwrap();
        self.webhook_with_header(payload, Some(format!("t={ts},v1={signature}"))).await
    }

    pub async fn webhook_with_header(&self, payload: String, signature: Option<String>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(Method::POST).uri("/api/webhooks/stripe");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        self.send(builder.body(Body::from(payload)).unwrap()).await
    }

    pub async fn user(&self, role: Role, loyalty_points: i64) -> (Profile, String) {
        let id = Uuid::new_v4();
        let profile = Profile {
            id,
            email: format!("{}@example.com", &id.simple().to_string()[..8]),
            role,
            first_name: Some("Test".into()),
            last_name: Some("User".into()),
            phone: None,
            company_name: None,
            vat_number: None,
            b2b_price_list_id: None,
            loyalty_points,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.store.insert_profile(profile.clone()).await;
        (profile, token_for(id))
    }

    pub async fn product(&self, name: &str, price: &str, stock: i32) -> Product {
        let request: ProductRequest =
            serde_json::from_value(json!({ "name": name, "price": price, "stock_quantity": stock })).unwrap();
        self.store.create_product(request.into_input().unwrap()).await.unwrap()
    }

    pub async fn stock_of(&self, id: Uuid) -> i32 {
        self.store.product(id).await.unwrap().unwrap().stock_quantity
    }

    pub async fn balance_of(&self, id: Uuid) -> i64 {
        self.store.profile(id).await.unwrap().unwrap().loyalty_points
    }
}

pub fn token_for(sub: Uuid) -> String {
    let claims = Claims { sub, exp: (Utc::now().timestamp() + 3600) as u64, email: None };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

pub fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

pub fn checkout_body(lines: &[(Uuid, i32)]) -> Value {
    let items: Vec<Value> = lines.iter().map(|(id, qty)| json!({ "productId": id, "quantity": qty })).collect();
    json!({
        "items": items,
        "customer": { "email": "jane@example.com", "firstName": "Jane", "lastName": "Doe" },
        "shippingAddress": { "street": "Keizersgracht", "houseNumber": "12", "postalCode": "1015CX", "city": "Amsterdam", "country": "NL" },
    })
}

pub fn session_event(id: &str, kind: &str, order_id: Uuid, payment_intent: &str) -> Value {
    json!({
        "id": id,
        "type": kind,
        "data": { "object": {
            "id": "cs_test_1",
            "metadata": { "orderId": order_id.to_string() },
            "payment_intent": payment_intent,
        }},
    })
}

pub fn refund_event(id: &str, payment_intent: &str) -> Value {
    json!({
        "id": id,
        "type": "charge.refunded",
        "data": { "object": { "id": "ch_1", "payment_intent": payment_intent } },
    })
}

pub fn payment_failed_event(id: &str, payment_intent: &str) -> Value {
    json!({
        "id": id,
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": payment_intent, "metadata": {} } },
    })
}
