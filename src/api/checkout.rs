use axum::{extract::State, Json};

use super::auth::MaybeUser;
use super::JsonBody;
use crate::services::checkout::{self, CheckoutRequest, CheckoutResponse};
use crate::{AppState, Result};

pub async fn create_order(
    State(s): State<AppState>,
    MaybeUser(caller): MaybeUser,
    JsonBody(req): JsonBody<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    Ok(Json(checkout::place_order(&s, caller.as_ref(), req).await?))
}
