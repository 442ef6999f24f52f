use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::admin::{order_detail, OrderDetail};
use super::auth::CurrentUser;
use super::{JsonBody, QueryParams};
use crate::model::{Order, Profile};
use crate::store::{OrderFilter, Page, Pagination, ProfileChanges};
use crate::{AppState, Result, StorefrontError};

#[derive(Debug, Default, Deserialize)]
pub struct AccountOrderParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn get_profile(user: CurrentUser) -> Json<Profile> {
    Json(user.0)
}

pub async fn update_profile(State(s): State<AppState>, user: CurrentUser, JsonBody(changes): JsonBody<ProfileChanges>) -> Result<Json<Profile>> {
    let profile = s.store.update_profile(user.id(), changes).await?.ok_or(StorefrontError::NotFound("Profile"))?;
    Ok(Json(profile))
}

pub async fn list_orders(State(s): State<AppState>, user: CurrentUser, QueryParams(p): QueryParams<AccountOrderParams>) -> Result<Json<Page<Order>>> {
    let filter = OrderFilter { user_id: Some(user.id()), page: Pagination::new(p.page, p.per_page), ..Default::default() };
    Ok(Json(s.store.list_orders(&filter).await?))
}

/// Someone else's order is reported as missing.
pub async fn get_order(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<OrderDetail>> {
    let order = s.store.order(id).await?
        .filter(|o| o.user_id == Some(user.id()))
        .ok_or(StorefrontError::NotFound("Order"))?;
    Ok(Json(order_detail(&s, order).await?))
}
