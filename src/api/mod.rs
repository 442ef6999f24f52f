//! HTTP API

use axum::{
    extract::FromRequest,
    routing::{get, patch, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{AppState, StorefrontError};

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod dashboard;
pub mod error;
pub mod loyalty;
pub mod setup;
pub mod webhooks;

/// `Json` whose rejections render as `{"error": ...}` with status 400.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(StorefrontError))]
pub struct JsonBody<T>(pub T);

/// `Query` with the same rejection shape.
#[derive(axum::extract::FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(StorefrontError))]
pub struct QueryParams<T>(pub T);

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "storefront"}))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // catalog
        .route("/api/products", get(catalog::list_products))
        .route("/api/products/:id", get(catalog::get_product))
        .route("/api/products/slug/:slug", get(catalog::get_product_by_slug))
        .route("/api/categories", get(catalog::list_categories))
        // cart
        .route("/api/cart/quote", post(cart::quote))
        .route("/api/cart/:scope", get(cart::get_cart).post(cart::add_item).delete(cart::clear_cart))
        .route("/api/cart/:scope/items/:product_id", patch(cart::update_item).delete(cart::remove_item))
        // checkout and payments
        .route("/api/checkout", post(checkout::create_order))
        .route("/api/webhooks/stripe", post(webhooks::stripe))
        .route("/api/loyalty", get(loyalty::overview).post(loyalty::redeem).put(loyalty::award))
        // account
        .route("/api/account/profile", get(account::get_profile).patch(account::update_profile))
        .route("/api/account/orders", get(account::list_orders))
        .route("/api/account/orders/:id", get(account::get_order))
        // admin
        .route("/api/admin/orders", get(admin::list_orders))
        .route("/api/admin/orders/:id", get(admin::get_order))
        .route("/api/admin/orders/:id/status", patch(admin::update_order_status))
        .route("/api/admin/products", get(admin::list_products).post(admin::create_product))
        .route("/api/admin/products/:id", get(admin::get_product).put(admin::update_product).delete(admin::delete_product))
        .route("/api/admin/products/:id/stock", patch(admin::update_stock))
        .route("/api/admin/inventory", get(admin::inventory))
        .route("/api/admin/customers", get(admin::list_customers))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/:id/role", patch(admin::update_role))
        // dashboards
        .route("/api/dashboard/admin", get(dashboard::admin))
        .route("/api/dashboard/employee", get(dashboard::employee))
        .route("/api/dashboard/b2b", get(dashboard::b2b))
        .route("/api/dashboard/consumer", get(dashboard::consumer))
        .route("/api/setup/admin", post(setup::bootstrap_admin))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
