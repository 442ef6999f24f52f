use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use crate::services::webhooks;
use crate::{AppState, Result};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Takes the raw body; the signature covers the exact bytes sent.
pub async fn stripe(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    webhooks::handle_delivery(&s, &body, signature).await?;
    Ok(Json(json!({ "received": true })))
}
