//! Persistence
//!
//! Every multi-row write the storefront performs (order + items + stock,
//! webhook event + order update + ledger, ledger + cached balance) is a single
//! `Store` call so implementations can make it atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{NewLoyaltyTransaction, NewOrder, ProductInput, Reconciliation};
use crate::model::{
    Category, LoyaltyReward, LoyaltyTransaction, Order, OrderItem, OrderStatus, PriceList, Product, Profile, Role,
};
use crate::payments::WebhookEvent;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Product {0} not found")]
    UnknownProduct(Uuid),

    #[error("Profile {0} not found")]
    UnknownProfile(Uuid),

    #[error("Insufficient stock for product {0}")]
    InsufficientStock(Uuid),

    #[error("Insufficient loyalty points")]
    InsufficientPoints,

    #[error("Duplicate {0}")]
    Conflict(String),

    #[error("Value out of range for {0}")]
    OutOfRange(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// =============================================================================
// Queries
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self { page: page.unwrap_or(1).max(1), per_page: per_page.unwrap_or(20).clamp(1, Self::MAX_PER_PAGE) }
    }
    pub fn first(per_page: u32) -> Self { Self::new(Some(1), Some(per_page)) }
    pub fn limit(&self) -> i64 { i64::from(self.per_page) }
    pub fn offset(&self) -> i64 { i64::from(self.page - 1) * i64::from(self.per_page) }
}

impl Default for Pagination {
    fn default() -> Self { Self::new(None, None) }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 { (self.total + i64::from(self.per_page) - 1) / i64::from(self.per_page) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    Name,
    PriceAsc,
    PriceDesc,
    #[default]
    Newest,
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub active_only: bool,
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock: bool,
    pub sort: ProductSort,
    pub page: Pagination,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    pub statuses: Vec<OrderStatus>,
    pub b2b_only: bool,
    pub search: Option<String>,
    pub oldest_first: bool,
    pub page: Pagination,
}

/// Orders an aggregate is computed over.
#[derive(Debug, Clone, Default)]
pub struct OrderScope {
    pub user_id: Option<Uuid>,
    pub b2b_only: bool,
    pub created_since: Option<DateTime<Utc>>,
    pub updated_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderSummary {
    pub total_orders: i64,
    pub paid_orders: i64,
    pub paid_revenue: Decimal,
    pub by_status: HashMap<OrderStatus, i64>,
}

impl OrderSummary {
    pub fn count(&self, status: OrderStatus) -> i64 { self.by_status.get(&status).copied().unwrap_or(0) }

    pub fn average_paid_order(&self) -> Decimal {
        if self.paid_orders == 0 { Decimal::ZERO } else { (self.paid_revenue / Decimal::from(self.paid_orders)).round_dp(2) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileFilter {
    pub roles: Vec<Role>,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Self-service profile edit; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub vat_number: Option<String>,
}

/// Result of applying a provider event to an order.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// The event id was already processed; nothing was written.
    Duplicate,
    OrderMissing,
    /// `reconciliation` may be a no-op when the transition was already in place.
    Applied { order: Order, reconciliation: Reconciliation },
}

pub(crate) fn search_pattern(search: &str) -> String {
    format!("%{}%", search.trim().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"))
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    // --- profiles ---
    async fn profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError>;
    async fn upsert_profile(&self, profile: NewProfile) -> Result<Profile, StoreError>;
    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> Result<Option<Profile>, StoreError>;
    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<Profile>, StoreError>;
    async fn list_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, StoreError>;
    async fn price_list(&self, id: Uuid) -> Result<Option<PriceList>, StoreError>;

    // --- catalog ---
    async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError>;
    /// Without images.
    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError>;
    async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>, StoreError>;
    /// Active products ordered by stock ascending, without images.
    async fn inventory(&self) -> Result<Vec<Product>, StoreError>;
    async fn create_product(&self, input: ProductInput) -> Result<Product, StoreError>;
    async fn update_product(&self, id: Uuid, input: ProductInput) -> Result<Option<Product>, StoreError>;
    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn set_stock(&self, id: Uuid, stock_quantity: i32) -> Result<Option<Product>, StoreError>;
    async fn categories(&self, active_only: bool) -> Result<Vec<Category>, StoreError>;

    // --- orders ---
    /// Inserts the order and its items and decrements stock, all or nothing.
    /// Fails with `InsufficientStock` rather than letting stock go negative.
    async fn place_order(&self, order: NewOrder) -> Result<Order, StoreError>;
    async fn attach_payment_session(&self, order_id: Uuid, session_id: &str) -> Result<(), StoreError>;
    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn order_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Order>, StoreError>;
    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError>;
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Page<Order>, StoreError>;
    async fn set_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Option<Order>, StoreError>;
    async fn order_summary(&self, scope: &OrderScope) -> Result<OrderSummary, StoreError>;
    /// Records the event id, reconciles the locked order and writes the
    /// resulting update and ledger entries in one unit.
    async fn apply_payment_event(&self, event: &WebhookEvent, order_id: Uuid) -> Result<EventOutcome, StoreError>;

    // --- loyalty ---
    /// Appends to the ledger and moves the cached balance with it.
    async fn append_loyalty(&self, entry: NewLoyaltyTransaction) -> Result<LoyaltyTransaction, StoreError>;
    /// Deducts `points_required` if the balance covers it; returns the new balance.
    async fn redeem_reward(&self, user_id: Uuid, reward: &LoyaltyReward) -> Result<i64, StoreError>;
    async fn loyalty_history(&self, user_id: Uuid) -> Result<Vec<LoyaltyTransaction>, StoreError>;
    /// Active rewards only.
    async fn reward(&self, id: Uuid) -> Result<Option<LoyaltyReward>, StoreError>;
    async fn rewards(&self) -> Result<Vec<LoyaltyReward>, StoreError>;
}
