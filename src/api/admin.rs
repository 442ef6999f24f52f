//! Staff and admin routes: order handling, product CRUD, inventory and users.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::auth::{CurrentUser, ADMIN, STAFF};
use super::{JsonBody, QueryParams};
use crate::domain::aggregates::ProductRequest;
use crate::domain::events::{DomainEvent, OrderEvent, ProductEvent};
use crate::model::{Order, OrderItem, OrderStatus, Product, Profile, Role};
use crate::store::{OrderFilter, OrderScope, Page, Pagination, ProductFilter, ProfileFilter};
use crate::{AppState, Result, StorefrontError};

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct OrderParams {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct OrderList {
    #[serde(flatten)]
    pub page: Page<Order>,
    pub counts: BTreeMap<&'static str, i64>,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

fn parse_status(value: &str) -> Result<OrderStatus> {
    value.parse().map_err(|_| StorefrontError::Validation("Invalid status".into()))
}

pub(crate) async fn order_detail(s: &AppState, order: Order) -> Result<OrderDetail> {
    let items = s.store.order_items(order.id).await?;
    Ok(OrderDetail { order, items })
}

pub async fn list_orders(State(s): State<AppState>, user: CurrentUser, QueryParams(p): QueryParams<OrderParams>) -> Result<Json<OrderList>> {
    user.require(STAFF)?;
    let statuses = match p.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => vec![],
        Some(status) => vec![parse_status(status)?],
    };
    let filter = OrderFilter { statuses, search: p.search, page: Pagination::new(p.page, p.per_page), ..Default::default() };
    let page = s.store.list_orders(&filter).await?;
    let summary = s.store.order_summary(&OrderScope::default()).await?;
    let mut counts: BTreeMap<&'static str, i64> = OrderStatus::ALL.iter().map(|st| (st.as_str(), summary.count(*st))).collect();
    counts.insert("all", summary.total_orders);
    Ok(Json(OrderList { page, counts }))
}

pub async fn get_order(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<OrderDetail>> {
    user.require(STAFF)?;
    let order = s.store.order(id).await?.ok_or(StorefrontError::NotFound("Order"))?;
    Ok(Json(order_detail(&s, order).await?))
}

pub async fn update_order_status(
    State(s): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<StatusUpdate>,
) -> Result<Json<Order>> {
    user.require(STAFF)?;
    let status = parse_status(req.status.trim())?;
    let order = s.store.set_order_status(id, status).await?.ok_or(StorefrontError::NotFound("Order"))?;
    tracing::info!(order_id = %order.id, %status, changed_by = %user.id(), "order status updated");
    s.events
        .publish(DomainEvent::Order(OrderEvent::StatusChanged { order_id: order.id, order_number: order.order_number.clone(), status }))
        .await;
    Ok(Json(order))
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AdminProductParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StockUpdate {
    pub stock_quantity: i32,
}

pub async fn list_products(State(s): State<AppState>, user: CurrentUser, QueryParams(p): QueryParams<AdminProductParams>) -> Result<Json<Page<Product>>> {
    user.require(ADMIN)?;
    let filter = ProductFilter { search: p.search, page: Pagination::new(p.page, p.per_page), ..Default::default() };
    Ok(Json(s.store.list_products(&filter).await?))
}

pub async fn get_product(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    user.require(ADMIN)?;
    s.store.product(id).await?.map(Json).ok_or(StorefrontError::NotFound("Product"))
}

pub async fn create_product(State(s): State<AppState>, user: CurrentUser, JsonBody(req): JsonBody<ProductRequest>) -> Result<(StatusCode, Json<Product>)> {
    user.require(ADMIN)?;
    let product = s.store.create_product(req.into_input()?).await?;
    tracing::info!(product_id = %product.id, slug = %product.slug, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>, JsonBody(req): JsonBody<ProductRequest>) -> Result<Json<Product>> {
    user.require(ADMIN)?;
    let product = s.store.update_product(id, req.into_input()?).await?.ok_or(StorefrontError::NotFound("Product"))?;
    Ok(Json(product))
}

pub async fn delete_product(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    user.require(ADMIN)?;
    if !s.store.delete_product(id).await? {
        return Err(StorefrontError::NotFound("Product"));
    }
    tracing::info!(product_id = %id, "product deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_stock(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>, JsonBody(req): JsonBody<StockUpdate>) -> Result<Json<Product>> {
    user.require(STAFF)?;
    if req.stock_quantity < 0 {
        return Err(StorefrontError::Validation("stock_quantity must not be negative".into()));
    }
    let product = s.store.set_stock(id, req.stock_quantity).await?.ok_or(StorefrontError::NotFound("Product"))?;
    s.events
        .publish(DomainEvent::Product(ProductEvent::StockChanged { product_id: product.id, stock_quantity: product.stock_quantity }))
        .await;
    Ok(Json(product))
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct InventoryCounts {
    pub total: usize,
    pub low_stock: usize,
    pub out_of_stock: usize,
    pub in_stock: usize,
}

impl InventoryCounts {
    pub fn of(products: &[Product]) -> Self {
        let mut counts = Self { total: products.len(), ..Default::default() };
        for p in products {
            if !p.is_in_stock() {
                counts.out_of_stock += 1;
            } else if p.is_low_stock() {
                counts.low_stock += 1;
            } else {
                counts.in_stock += 1;
            }
        }
        counts
    }
}

#[derive(Debug, Serialize)]
pub struct Inventory {
    pub products: Vec<Product>,
    pub counts: InventoryCounts,
}

pub async fn inventory(State(s): State<AppState>, user: CurrentUser) -> Result<Json<Inventory>> {
    user.require(STAFF)?;
    let products = s.store.inventory().await?;
    let counts = InventoryCounts::of(&products);
    Ok(Json(Inventory { products, counts }))
}

// =============================================================================
// Customers and users
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CustomerParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct CustomerStats {
    pub b2c: usize,
    pub b2b: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct CustomerList {
    pub customers: Vec<Profile>,
    pub stats: CustomerStats,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub role: String,
}

pub async fn list_customers(State(s): State<AppState>, user: CurrentUser, QueryParams(p): QueryParams<CustomerParams>) -> Result<Json<CustomerList>> {
    user.require(ADMIN)?;
    let roles = match p.kind.as_deref() {
        Some("b2c") => vec![Role::Consumer],
        Some("b2b") => vec![Role::B2b],
        None | Some("") | Some("all") => vec![Role::Consumer, Role::B2b],
        Some(other) => return Err(StorefrontError::Validation(format!("Invalid customer type '{other}'"))),
    };
    let customers = s.store.list_profiles(&ProfileFilter { roles, search: p.search }).await?;

    let everyone = s.store.list_profiles(&ProfileFilter { roles: vec![Role::Consumer, Role::B2b], search: None }).await?;
    let b2b = everyone.iter().filter(|p| p.role == Role::B2b).count();
    let stats = CustomerStats { b2c: everyone.len() - b2b, b2b, total: everyone.len() };
    Ok(Json(CustomerList { customers, stats }))
}

pub async fn list_users(State(s): State<AppState>, user: CurrentUser) -> Result<Json<Vec<Profile>>> {
    user.require(ADMIN)?;
    Ok(Json(s.store.list_profiles(&ProfileFilter::default()).await?))
}

pub async fn update_role(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>, JsonBody(req): JsonBody<RoleUpdate>) -> Result<Json<Profile>> {
    user.require(ADMIN)?;
    let role: Role = req.role.trim().parse().map_err(|_| StorefrontError::Validation("Invalid role".into()))?;
    let profile = s.store.set_role(id, role).await?.ok_or(StorefrontError::NotFound("Profile"))?;
    tracing::info!(user_id = %id, %role, changed_by = %user.id(), "role updated");
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn product(stock: i32) -> Product {
        Product {
            id: Uuid::new_v4(), slug: format!("p-{stock}"), name: "P".into(), description: None, short_description: None,
            price: Decimal::ONE, compare_at_price: None, cost_price: None, sku: None, barcode: None,
            stock_quantity: stock, low_stock_threshold: 5, category_id: None, is_active: true, is_featured: false,
            weight: None, meta_title: None, meta_description: None, images: vec![], created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_inventory_counts() {
        let counts = InventoryCounts::of(&[product(0), product(3), product(5), product(40)]);
        assert_eq!(counts, InventoryCounts { total: 4, low_stock: 2, out_of_stock: 1, in_stock: 1 });
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("processing").unwrap(), OrderStatus::Processing);
        assert!(matches!(parse_status("lost"), Err(StorefrontError::Validation(m)) if m == "Invalid status"));
    }
}
