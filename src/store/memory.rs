//! In-process store used when no database is configured, and by the test suite.

use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    EventOutcome, NewProfile, OrderFilter, OrderScope, OrderSummary, Page, Pagination, ProductFilter, ProductSort,
    ProfileChanges, ProfileFilter, Store, StoreError,
};
use crate::domain::aggregates::{NewLoyaltyTransaction, NewOrder, ProductInput};
use crate::model::{
    Category, LoyaltyReward, LoyaltyTransaction, Order, OrderItem, OrderStatus, PaymentStatus, PriceList, Product,
    ProductImage, Profile, Role,
};
use crate::payments::WebhookEvent;

#[derive(Default)]
struct State {
    profiles: HashMap<Uuid, Profile>,
    price_lists: HashMap<Uuid, PriceList>,
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderItem>,
    ledger: Vec<LoyaltyTransaction>,
    rewards: HashMap<Uuid, LoyaltyReward>,
    processed_events: HashSet<String>,
}

impl State {
    /// Appends a ledger row and moves the cached balance with it.
    fn push_ledger(&mut self, entry: NewLoyaltyTransaction) -> Result<LoyaltyTransaction, StoreError> {
        let profile = self.profiles.get_mut(&entry.user_id).ok_or(StoreError::UnknownProfile(entry.user_id))?;
        profile.loyalty_points += entry.points;
        profile.updated_at = Utc::now();
        let row = LoyaltyTransaction {
            id: Uuid::now_v7(),
            user_id: entry.user_id,
            order_id: entry.order_id,
            points: entry.points,
            kind: entry.kind,
            description: entry.description,
            created_at: Utc::now(),
        };
        self.ledger.push(row.clone());
        Ok(row)
    }

    fn orders_in(&self, scope: &OrderScope) -> impl Iterator<Item = &Order> + '_ {
        let scope = scope.clone();
        self.orders.values().filter(move |o| {
            scope.user_id.map_or(true, |u| o.user_id == Some(u))
                && (!scope.b2b_only || o.is_b2b)
                && scope.created_since.map_or(true, |t| o.created_at >= t)
                && scope.updated_since.map_or(true, |t| o.updated_at >= t)
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    fail_item_inserts: AtomicBool,
}

fn paginate<T>(items: Vec<T>, page: Pagination) -> Page<T> {
    let total = items.len() as i64;
    let data = items.into_iter().skip(page.offset() as usize).take(page.per_page as usize).collect();
    Page { data, total, page: page.page, per_page: page.per_page }
}

fn contains(field: Option<&str>, needle: &str) -> bool {
    field.map_or(false, |f| f.to_lowercase().contains(needle))
}

fn image_rows(product_id: Uuid, urls: &[String]) -> Vec<ProductImage> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| ProductImage { id: Uuid::new_v4(), product_id, url: url.clone(), alt_text: None, position: i as i32 })
        .collect()
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Makes the next order-item write fail after the order row went in, so
    /// callers can observe that nothing of the order survives.
    pub fn fail_next_item_insert(&self) { self.fail_item_inserts.store(true, Ordering::SeqCst); }

    pub async fn insert_profile(&self, profile: Profile) { self.state.write().await.profiles.insert(profile.id, profile); }
    pub async fn insert_price_list(&self, list: PriceList) { self.state.write().await.price_lists.insert(list.id, list); }
    pub async fn insert_category(&self, category: Category) { self.state.write().await.categories.insert(category.id, category); }
    pub async fn insert_reward(&self, reward: LoyaltyReward) { self.state.write().await.rewards.insert(reward.id, reward); }

    pub async fn order_count(&self) -> usize { self.state.read().await.orders.len() }
    pub async fn ledger_len(&self) -> usize { self.state.read().await.ledger.len() }
}

#[async_trait]
impl Store for MemoryStore {
    async fn profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(self.state.read().await.profiles.get(&id).cloned())
    }

    async fn upsert_profile(&self, new: NewProfile) -> Result<Profile, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let profile = state.profiles.entry(new.id).or_insert_with(|| Profile {
            id: new.id, email: new.email.clone(), role: new.role, first_name: None, last_name: None, phone: None,
            company_name: None, vat_number: None, b2b_price_list_id: None, loyalty_points: 0, created_at: now, updated_at: now,
        });
        profile.email = new.email;
        profile.role = new.role;
        if new.first_name.is_some() { profile.first_name = new.first_name; }
        if new.last_name.is_some() { profile.last_name = new.last_name; }
        profile.updated_at = now;
        Ok(profile.clone())
    }

    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> Result<Option<Profile>, StoreError> {
        let mut state = self.state.write().await;
        let Some(profile) = state.profiles.get_mut(&id) else { return Ok(None) };
        if changes.first_name.is_some() { profile.first_name = changes.first_name; }
        if changes.last_name.is_some() { profile.last_name = changes.last_name; }
        if changes.phone.is_some() { profile.phone = changes.phone; }
        if changes.company_name.is_some() { profile.company_name = changes.company_name; }
        if changes.vat_number.is_some() { profile.vat_number = changes.vat_number; }
        profile.updated_at = Utc::now();
        Ok(Some(profile.clone()))
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<Profile>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.profiles.get_mut(&id).map(|p| {
            p.role = role;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn list_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, StoreError> {
        let state = self.state.read().await;
        let needle = filter.search.as_deref().map(|s| s.trim().to_lowercase());
        let mut profiles: Vec<Profile> = state.profiles.values()
            .filter(|p| filter.roles.is_empty() || filter.roles.contains(&p.role))
            .filter(|p| needle.as_deref().map_or(true, |n| {
                p.email.to_lowercase().contains(n)
                    || contains(p.first_name.as_deref(), n)
                    || contains(p.last_name.as_deref(), n)
                    || contains(p.company_name.as_deref(), n)
            }))
            .cloned()
            .collect();
        profiles.sort_by_key(|p| Reverse(p.created_at));
        Ok(profiles)
    }

    async fn price_list(&self, id: Uuid) -> Result<Option<PriceList>, StoreError> {
        Ok(self.state.read().await.price_lists.get(&id).cloned())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.state.read().await.products.values().find(|p| p.slug == slug).cloned())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id)).map(|p| Product { images: vec![], ..p.clone() }).collect())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>, StoreError> {
        let state = self.state.read().await;
        let needle = filter.search.as_deref().map(|s| s.trim().to_lowercase());
        let mut products: Vec<Product> = state.products.values()
            .filter(|p| !filter.active_only || p.is_active)
            .filter(|p| filter.category_id.map_or(true, |c| p.category_id == Some(c)))
            .filter(|p| needle.as_deref().map_or(true, |n| p.name.to_lowercase().contains(n) || contains(p.description.as_deref(), n)))
            .filter(|p| filter.min_price.map_or(true, |min| p.price >= min))
            .filter(|p| filter.max_price.map_or(true, |max| p.price <= max))
            .filter(|p| !filter.in_stock || p.stock_quantity > 0)
            .cloned()
            .collect();
        match filter.sort {
            ProductSort::Name => products.sort_by(|a, b| a.name.cmp(&b.name)),
            ProductSort::PriceAsc => products.sort_by_key(|p| p.price),
            ProductSort::PriceDesc => products.sort_by_key(|p| Reverse(p.price)),
            ProductSort::Newest => products.sort_by_key(|p| Reverse(p.created_at)),
        }
        Ok(paginate(products, filter.page))
    }

    async fn inventory(&self) -> Result<Vec<Product>, StoreError> {
        let state = self.state.read().await;
        let mut products: Vec<Product> = state.products.values().filter(|p| p.is_active).map(|p| Product { images: vec![], ..p.clone() }).collect();
        products.sort_by(|a, b| a.stock_quantity.cmp(&b.stock_quantity).then_with(|| a.name.cmp(&b.name)));
        Ok(products)
    }

    async fn create_product(&self, input: ProductInput) -> Result<Product, StoreError> {
        let mut state = self.state.write().await;
        if state.products.values().any(|p| p.slug == input.slug) {
            return Err(StoreError::Conflict(format!("product slug '{}'", input.slug)));
        }
        let id = Uuid::new_v4();
        let now = Utc::now();
        let images = image_rows(id, input.images.as_deref().unwrap_or_default());
        let product = Product {
            id, slug: input.slug, name: input.name, description: input.description, short_description: input.short_description,
            price: input.price, compare_at_price: input.compare_at_price, cost_price: input.cost_price, sku: input.sku,
            barcode: input.barcode, stock_quantity: input.stock_quantity, low_stock_threshold: input.low_stock_threshold,
            category_id: input.category_id, is_active: input.is_active, is_featured: input.is_featured, weight: input.weight,
            meta_title: input.meta_title, meta_description: input.meta_description, images, created_at: now, updated_at: now,
        };
        state.products.insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, input: ProductInput) -> Result<Option<Product>, StoreError> {
        let mut state = self.state.write().await;
        if state.products.values().any(|p| p.id != id && p.slug == input.slug) {
            return Err(StoreError::Conflict(format!("product slug '{}'", input.slug)));
        }
        let Some(p) = state.products.get_mut(&id) else { return Ok(None) };
        p.slug = input.slug;
        p.name = input.name;
        p.description = input.description;
        p.short_description = input.short_description;
        p.price = input.price;
        p.compare_at_price = input.compare_at_price;
        p.cost_price = input.cost_price;
        p.sku = input.sku;
        p.barcode = input.barcode;
        p.stock_quantity = input.stock_quantity;
        p.low_stock_threshold = input.low_stock_threshold;
        p.category_id = input.category_id;
        p.is_active = input.is_active;
        p.is_featured = input.is_featured;
        p.weight = input.weight;
        p.meta_title = input.meta_title;
        p.meta_description = input.meta_description;
        if let Some(urls) = &input.images { p.images = image_rows(id, urls); }
        p.updated_at = Utc::now();
        Ok(Some(p.clone()))
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let removed = state.products.remove(&id).is_some();
        if removed {
            for item in state.order_items.iter_mut().filter(|i| i.product_id == Some(id)) {
                item.product_id = None;
            }
        }
        Ok(removed)
    }

    async fn set_stock(&self, id: Uuid, stock_quantity: i32) -> Result<Option<Product>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.products.get_mut(&id).map(|p| {
            p.stock_quantity = stock_quantity;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn categories(&self, active_only: bool) -> Result<Vec<Category>, StoreError> {
        let state = self.state.read().await;
        let mut categories: Vec<Category> = state.categories.values().filter(|c| !active_only || c.is_active).cloned().collect();
        categories.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));
        Ok(categories)
    }

    async fn place_order(&self, new: NewOrder) -> Result<Order, StoreError> {
        let mut state = self.state.write().await;

        let mut wanted: BTreeMap<Uuid, i32> = BTreeMap::new();
        for item in &new.items {
            let total = wanted.entry(item.product_id).or_default();
            // a sum past i32::MAX exceeds any stock level
            *total = total.checked_add(item.quantity).ok_or(StoreError::InsufficientStock(item.product_id))?;
        }
        for (product_id, quantity) in &wanted {
            let product = state.products.get(product_id).ok_or(StoreError::UnknownProduct(*product_id))?;
            if product.stock_quantity < *quantity {
                return Err(StoreError::InsufficientStock(*product_id));
            }
        }

        let now = Utc::now();
        let order = Order {
            id: new.id, order_number: new.order_number, user_id: new.user_id, guest_email: new.guest_email,
            status: OrderStatus::Pending, payment_status: PaymentStatus::Pending,
            customer_email: new.customer.email, customer_first_name: new.customer.first_name,
            customer_last_name: new.customer.last_name, customer_phone: new.customer.phone,
            shipping_street: new.shipping.street, shipping_house_number: new.shipping.house_number,
            shipping_postal_code: new.shipping.postal_code, shipping_city: new.shipping.city, shipping_country: new.shipping.country,
            billing_street: new.billing.street, billing_house_number: new.billing.house_number,
            billing_postal_code: new.billing.postal_code, billing_city: new.billing.city, billing_country: new.billing.country,
            subtotal: new.totals.subtotal, tax: new.totals.tax, shipping_cost: new.totals.shipping_cost, total: new.totals.total,
            loyalty_points_earned: new.loyalty_points_earned, payment_session_id: None, payment_intent_id: None,
            notes: new.notes, is_b2b: new.is_b2b, invoice_number: None, created_at: now, updated_at: now,
        };
        state.orders.insert(order.id, order.clone());

        if self.fail_item_inserts.swap(false, Ordering::SeqCst) {
            state.orders.remove(&order.id);
            return Err(StoreError::Storage("order item insert failed".into()));
        }

        for item in &new.items {
            state.order_items.push(OrderItem {
                id: Uuid::new_v4(),
                order_id: order.id,
                product_id: Some(item.product_id),
                product_name: item.product_name.clone(),
                product_sku: item.product_sku.clone(),
                quantity: item.quantity,
                price: item.price,
                total: item.total(),
            });
        }
        for (product_id, quantity) in wanted {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.stock_quantity -= quantity;
                product.updated_at = now;
            }
        }
        Ok(order)
    }

    async fn attach_payment_session(&self, order_id: Uuid, session_id: &str) -> Result<(), StoreError> {
        if let Some(order) = self.state.write().await.orders.get_mut(&order_id) {
            order.payment_session_id = Some(session_id.to_string());
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn order_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Order>, StoreError> {
        let state = self.state.read().await;
        Ok(state.orders.values().find(|o| o.payment_intent_id.as_deref() == Some(payment_intent_id)).cloned())
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self.state.read().await.order_items.iter().filter(|i| i.order_id == order_id).cloned().collect())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Page<Order>, StoreError> {
        let state = self.state.read().await;
        let needle = filter.search.as_deref().map(|s| s.trim().to_lowercase());
        let mut orders: Vec<Order> = state.orders.values()
            .filter(|o| filter.user_id.map_or(true, |u| o.user_id == Some(u)))
            .filter(|o| filter.statuses.is_empty() || filter.statuses.contains(&o.status))
            .filter(|o| !filter.b2b_only || o.is_b2b)
            .filter(|o| needle.as_deref().map_or(true, |n| {
                o.order_number.to_lowercase().contains(n) || o.customer_email.to_lowercase().contains(n)
            }))
            .cloned()
            .collect();
        if filter.oldest_first {
            orders.sort_by_key(|o| o.created_at);
        } else {
            orders.sort_by_key(|o| Reverse(o.created_at));
        }
        Ok(paginate(orders, filter.page))
    }

    async fn set_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Option<Order>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.orders.get_mut(&id).map(|o| {
            o.status = status;
            o.updated_at = Utc::now();
            o.clone()
        }))
    }

    async fn order_summary(&self, scope: &OrderScope) -> Result<OrderSummary, StoreError> {
        let state = self.state.read().await;
        let mut summary = OrderSummary::default();
        for order in state.orders_in(scope) {
            summary.total_orders += 1;
            *summary.by_status.entry(order.status).or_default() += 1;
            if order.payment_status == PaymentStatus::Paid {
                summary.paid_orders += 1;
                summary.paid_revenue += order.total;
            }
        }
        Ok(summary)
    }

    async fn apply_payment_event(&self, event: &WebhookEvent, order_id: Uuid) -> Result<EventOutcome, StoreError> {
        let mut state = self.state.write().await;
        if state.processed_events.contains(&event.id) {
            return Ok(EventOutcome::Duplicate);
        }
        let Some(order) = state.orders.get(&order_id).cloned() else { return Ok(EventOutcome::OrderMissing) };

        let reconciliation = order.reconcile(&event.event);
        // nothing is written unless every ledger entry has a profile to post to
        if let Some(entry) = reconciliation.ledger.iter().find(|e| !state.profiles.contains_key(&e.user_id)) {
            return Err(StoreError::UnknownProfile(entry.user_id));
        }
        let mut order = order;
        if let Some(update) = &reconciliation.update {
            update.apply_to(&mut order);
            order.updated_at = Utc::now();
            state.orders.insert(order.id, order.clone());
        }
        for entry in reconciliation.ledger.iter().cloned() {
            state.push_ledger(entry)?;
        }
        state.processed_events.insert(event.id.clone());
        Ok(EventOutcome::Applied { order, reconciliation })
    }

    async fn append_loyalty(&self, entry: NewLoyaltyTransaction) -> Result<LoyaltyTransaction, StoreError> {
        self.state.write().await.push_ledger(entry)
    }

    async fn redeem_reward(&self, user_id: Uuid, reward: &LoyaltyReward) -> Result<i64, StoreError> {
        let mut state = self.state.write().await;
        let balance = state.profiles.get(&user_id).ok_or(StoreError::UnknownProfile(user_id))?.loyalty_points;
        if balance < reward.points_required {
            return Err(StoreError::InsufficientPoints);
        }
        state.push_ledger(NewLoyaltyTransaction::redeemed(user_id, reward))?;
        Ok(balance - reward.points_required)
    }

    async fn loyalty_history(&self, user_id: Uuid) -> Result<Vec<LoyaltyTransaction>, StoreError> {
        let state = self.state.read().await;
        let mut history: Vec<LoyaltyTransaction> = state.ledger.iter().filter(|t| t.user_id == user_id).cloned().collect();
        history.sort_by_key(|t| Reverse(t.created_at));
        Ok(history)
    }

    async fn reward(&self, id: Uuid) -> Result<Option<LoyaltyReward>, StoreError> {
        Ok(self.state.read().await.rewards.get(&id).filter(|r| r.is_active).cloned())
    }

    async fn rewards(&self) -> Result<Vec<LoyaltyReward>, StoreError> {
        let state = self.state.read().await;
        let mut rewards: Vec<LoyaltyReward> = state.rewards.values().filter(|r| r.is_active).cloned().collect();
        rewards.sort_by_key(|r| r.points_required);
        Ok(rewards)
    }
}
