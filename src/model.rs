//! Persisted records
//!
//! Row types shared by the store implementations and the HTTP layer. Field
//! names follow the database columns and are serialized as-is.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Enumerations
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Employee,
    B2b,
    Consumer,
    Guest,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "loyalty_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyKind {
    Earned,
    Redeemed,
    Expired,
    Adjusted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reward_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    Discount,
    Percentage,
    FreeShipping,
    FreeProduct,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Admin, Role::Employee, Role::B2b, Role::Consumer, Role::Guest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
            Role::B2b => "b2b",
            Role::Consumer => "consumer",
            Role::Guest => "guest",
        }
    }
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl FromStr for Role {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL.into_iter().find(|r| r.as_str() == s).ok_or_else(|| ParseEnumError { kind: "role", value: s.to_string() })
    }
}

impl FromStr for OrderStatus {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| ParseEnumError { kind: "order status", value: s.to_string() })
    }
}

// =============================================================================
// Profiles
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub vat_number: Option<String>,
    pub b2b_price_list_id: Option<Uuid>,
    /// Cached running sum of the user's loyalty ledger.
    pub loyalty_points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceList {
    pub id: Uuid,
    pub name: String,
    pub discount_percentage: Decimal,
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub cost_price: Option<Decimal>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub category_id: Option<Uuid>,
    pub is_active: bool,
    pub is_featured: bool,
    pub weight: Option<Decimal>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    #[sqlx(skip)]
    pub images: Vec<ProductImage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductImage {
    pub id: Uuid,
    pub product_id: Uuid,
    pub url: String,
    pub alt_text: Option<String>,
    pub position: i32,
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub customer_email: String,
    pub customer_first_name: String,
    pub customer_last_name: String,
    pub customer_phone: Option<String>,
    pub shipping_street: String,
    pub shipping_house_number: String,
    pub shipping_postal_code: String,
    pub shipping_city: String,
    pub shipping_country: String,
    pub billing_street: String,
    pub billing_house_number: String,
    pub billing_postal_code: String,
    pub billing_city: String,
    pub billing_country: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub loyalty_points_earned: i64,
    pub payment_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub notes: Option<String>,
    pub is_b2b: bool,
    pub invoice_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub product_sku: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
    pub total: Decimal,
}

// =============================================================================
// Loyalty
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoyaltyTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: Option<Uuid>,
    pub points: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: LoyaltyKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoyaltyReward {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub points_required: i64,
    pub reward_type: RewardType,
    pub reward_value: Decimal,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_parses_only_known_values() {
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
        assert!("Shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn role_round_trips_through_serde() {
        let json = serde_json::to_string(&Role::B2b).unwrap();
        assert_eq!(json, "\"b2b\"");
        assert_eq!("b2b".parse::<Role>().unwrap(), Role::B2b);
    }
}
