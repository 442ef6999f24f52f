//! Cart Aggregate
//!
//! Visitor-side basket. Prices are snapshotted when a product is added and are
//! never authoritative: checkout re-prices every line against the catalog.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::pricing::{loyalty_points_for, tax_for};
use crate::model::Product;

/// Upper bound for one cart or order line.
pub const MAX_LINE_QUANTITY: u32 = 10_000;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn from_items(items: Vec<CartItem>) -> Result<Self, CartError> {
        let mut cart = Self::new();
        for item in items { cart.push(item)?; }
        Ok(cart)
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }

    /// Adds `quantity` of `product`, merging with an existing line. No stock check.
    pub fn add_item(&mut self, product: &Product, quantity: u32) -> Result<(), CartError> {
        self.push(CartItem {
            product_id: product.id,
            name: product.name.clone(),
            sku: product.sku.clone(),
            quantity,
            unit_price: product.price,
        })
    }

    /// `quantity == 0` removes the line.
    pub fn update_quantity(&mut self, product_id: Uuid, quantity: u32) -> Result<(), CartError> {
        let quantity = within_limit(Some(quantity))?;
        let item = self.items.iter_mut().find(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound(product_id))?;
        if quantity == 0 { self.items.retain(|i| i.product_id != product_id); }
        else { item.quantity = quantity; }
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound(product_id)); }
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); }

    pub fn subtotal(&self) -> Decimal { self.items.iter().map(CartItem::line_total).sum() }
    pub fn tax(&self) -> Decimal { tax_for(self.subtotal()) }
    /// Subtotal plus tax, before shipping.
    pub fn total(&self) -> Decimal { self.subtotal() + self.tax() }
    pub fn loyalty_preview(&self) -> i64 { loyalty_points_for(self.subtotal()) }

    fn push(&mut self, item: CartItem) -> Result<(), CartError> {
        if item.quantity == 0 { return Ok(()); }
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id) {
            existing.quantity = within_limit(existing.quantity.checked_add(item.quantity))?;
        } else {
            within_limit(Some(item.quantity))?;
            self.items.push(item);
        }
        Ok(())
    }
}

fn within_limit(quantity: Option<u32>) -> Result<u32, CartError> {
    quantity.filter(|q| *q <= MAX_LINE_QUANTITY).ok_or(CartError::QuantityTooLarge(MAX_LINE_QUANTITY))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("product {0} is not in the cart")]
    ItemNotFound(Uuid),
    #[error("quantity may not exceed {0} per line")]
    QuantityTooLarge(u32),
}

/// Scoped cart persistence (one cart per visitor scope, e.g. a browser session).
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn load(&self, scope: &str) -> Cart;
    async fn save(&self, scope: &str, cart: &Cart);
    async fn clear(&self, scope: &str);
}

pub const DEFAULT_CART_CAPACITY: usize = 10_000;
pub const DEFAULT_CART_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

struct StoredCart {
    cart: Cart,
    saved_at: Instant,
    save_seq: u64,
}

/// Bounded in-process carts. Entries expire `ttl` after their last save, and
/// once `capacity` scopes are held the least recently saved one is evicted.
pub struct MemoryCartStore {
    carts: RwLock<HashMap<String, StoredCart>>,
    saves: AtomicU64,
    capacity: usize,
    ttl: Duration,
}

impl Default for MemoryCartStore {
    fn default() -> Self { Self::with_limits(DEFAULT_CART_CAPACITY, DEFAULT_CART_TTL) }
}

impl MemoryCartStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self { carts: RwLock::new(HashMap::new()), saves: AtomicU64::new(0), capacity: capacity.max(1), ttl }
    }

    pub async fn cart_count(&self) -> usize {
        self.carts.read().await.values().filter(|c| c.saved_at.elapsed() < self.ttl).count()
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn load(&self, scope: &str) -> Cart {
        self.carts
            .read()
            .await
            .get(scope)
            .filter(|c| c.saved_at.elapsed() < self.ttl)
            .map(|c| c.cart.clone())
            .unwrap_or_default()
    }

    async fn save(&self, scope: &str, cart: &Cart) {
        let mut carts = self.carts.write().await;
        if cart.is_empty() {
            carts.remove(scope);
            return;
        }
        let ttl = self.ttl;
        carts.retain(|_, c| c.saved_at.elapsed() < ttl);
        if !carts.contains_key(scope) && carts.len() >= self.capacity {
            let oldest = carts.iter().min_by_key(|(_, c)| c.save_seq).map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                carts.remove(&oldest);
                tracing::debug!(scope = %oldest, capacity = self.capacity, "evicted least recently saved cart");
            }
        }
        carts.insert(scope.to_string(), StoredCart {
            cart: cart.clone(),
            saved_at: Instant::now(),
            save_seq: self.saves.fetch_add(1, Ordering::Relaxed),
        });
    }

    async fn clear(&self, scope: &str) { self.carts.write().await.remove(scope); }
}
