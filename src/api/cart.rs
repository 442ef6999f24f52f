//! Cart routes. Carts are keyed by an opaque visitor scope and only ever
//! quote prices; checkout re-prices against the catalog.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::JsonBody;
use crate::domain::aggregates::{Cart, CartItem};
use crate::domain::pricing::shipping_for;
use crate::model::Product;
use crate::{AppState, Result, StorefrontError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub item_count: u32,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    /// What checkout will charge for shipping on top of `total`.
    pub shipping_cost: Decimal,
    pub loyalty_preview: i64,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            items: cart.items().to_vec(),
            item_count: cart.item_count(),
            subtotal: cart.subtotal(),
            tax: cart.tax(),
            total: cart.total(),
            shipping_cost: if cart.is_empty() { Decimal::ZERO } else { shipping_for(cart.subtotal()) },
            loyalty_preview: cart.loyalty_preview(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteLine {
    pub product_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub items: Vec<QuoteLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItem {
    pub product_id: Uuid,
    #[serde(default = "one")]
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetQuantity {
    pub quantity: i64,
}

fn one() -> i64 { 1 }

/// Negative quantities count as zero; anything past `u32` saturates and is then rejected by the cart's line cap.
fn clamp_quantity(quantity: i64) -> u32 { u32::try_from(quantity.max(0)).unwrap_or(u32::MAX) }

async fn active_product(s: &AppState, id: Uuid) -> Result<Product> {
    s.store.product(id).await?.filter(|p| p.is_active).ok_or(StorefrontError::NotFound("Product"))
}

/// Prices lines against the live catalog without storing anything.
pub async fn quote(State(s): State<AppState>, JsonBody(req): JsonBody<QuoteRequest>) -> Result<Json<CartView>> {
    let ids: Vec<Uuid> = req.items.iter().map(|l| l.product_id).collect();
    let catalog: HashMap<Uuid, Product> = s.store.products_by_ids(&ids).await?.into_iter().map(|p| (p.id, p)).collect();
    let mut cart = Cart::new();
    for line in &req.items {
        let product = catalog.get(&line.product_id).filter(|p| p.is_active).ok_or(StorefrontError::NotFound("Product"))?;
        cart.add_item(product, clamp_quantity(line.quantity))?;
    }
    Ok(Json(CartView::from(&cart)))
}

pub async fn get_cart(State(s): State<AppState>, Path(scope): Path<String>) -> Json<CartView> {
    Json(CartView::from(&s.carts.load(&scope).await))
}

pub async fn add_item(State(s): State<AppState>, Path(scope): Path<String>, JsonBody(req): JsonBody<AddItem>) -> Result<Json<CartView>> {
    let product = active_product(&s, req.product_id).await?;
    let mut cart = s.carts.load(&scope).await;
    cart.add_item(&product, clamp_quantity(req.quantity))?;
    s.carts.save(&scope, &cart).await;
    Ok(Json(CartView::from(&cart)))
}

pub async fn update_item(
    State(s): State<AppState>,
    Path((scope, product_id)): Path<(String, Uuid)>,
    JsonBody(req): JsonBody<SetQuantity>,
) -> Result<Json<CartView>> {
    let mut cart = s.carts.load(&scope).await;
    cart.update_quantity(product_id, clamp_quantity(req.quantity))?;
    s.carts.save(&scope, &cart).await;
    Ok(Json(CartView::from(&cart)))
}

pub async fn remove_item(State(s): State<AppState>, Path((scope, product_id)): Path<(String, Uuid)>) -> Result<Json<CartView>> {
    let mut cart = s.carts.load(&scope).await;
    cart.remove_item(product_id)?;
    s.carts.save(&scope, &cart).await;
    Ok(Json(CartView::from(&cart)))
}

pub async fn clear_cart(State(s): State<AppState>, Path(scope): Path<String>) -> StatusCode {
    s.carts.clear(&scope).await;
    StatusCode::NO_CONTENT
}
