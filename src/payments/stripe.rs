//! Stripe Checkout client.

use async_trait::async_trait;
use serde::Deserialize;

use super::webhook::{ORDER_ID_KEY, ORDER_NUMBER_KEY};
use super::{CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentProvider};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self::with_api_base(secret_key, DEFAULT_API_BASE)
    }

    pub fn with_api_base(secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), secret_key: secret_key.into(), api_base: api_base.into() }
    }

    /// Form fields for `POST /v1/checkout/sessions`.
    pub fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("payment_method_types[1]".to_string(), "ideal".to_string()),
            ("customer_email".to_string(), request.customer_email.clone()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            (format!("metadata[{ORDER_ID_KEY}]"), request.order_id.to_string()),
            (format!("metadata[{ORDER_NUMBER_KEY}]"), request.order_number.clone()),
            (format!("payment_intent_data[metadata][{ORDER_ID_KEY}]"), request.order_id.to_string()),
            (format!("payment_intent_data[metadata][{ORDER_NUMBER_KEY}]"), request.order_number.clone()),
        ];
        for (i, line) in request.lines.iter().enumerate() {
            form.push((format!("line_items[{i}][price_data][currency]"), request.currency.clone()));
            form.push((format!("line_items[{i}][price_data][product_data][name]"), line.name.clone()));
            form.push((format!("line_items[{i}][price_data][unit_amount]"), line.unit_amount.to_string()));
            form.push((format!("line_items[{i}][quantity]"), line.quantity.to_string()));
        }
        form
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[tracing::instrument(skip(self, request), fields(order_number = %request.order_number))]
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError> {
        let response = self.http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&Self::session_form(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.json::<ErrorBody>().await.ok().and_then(|b| b.error.message).unwrap_or_else(|| status.to_string());
            return Err(PaymentError::Provider(message));
        }
        Ok(response.json::<CheckoutSession>().await?)
    }
}
