//! PostgreSQL store.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::{
    search_pattern, EventOutcome, NewProfile, OrderFilter, OrderScope, OrderSummary, Page, ProductFilter, ProductSort,
    ProfileChanges, ProfileFilter, Store, StoreError,
};
use crate::domain::aggregates::{NewLoyaltyTransaction, NewOrder, ProductInput};
use crate::model::{
    Category, LoyaltyReward, LoyaltyTransaction, Order, OrderItem, OrderStatus, PriceList, Product, ProductImage, Profile, Role,
};
use crate::payments::WebhookEvent;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

fn conflict_or(e: sqlx::Error, what: String) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what),
        sqlx::Error::Database(db) if db.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE) => StoreError::OutOfRange(what),
        _ => StoreError::Database(e),
    }
}

fn out_of_range_or(e: sqlx::Error, what: String) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE) => StoreError::OutOfRange(what),
        _ => StoreError::Database(e),
    }
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn attach_images(&self, products: &mut [Product]) -> Result<(), StoreError> {
        if products.is_empty() { return Ok(()); }
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let images = sqlx::query_as::<_, ProductImage>("SELECT * FROM product_images WHERE product_id = ANY($1) ORDER BY position")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        let mut by_product: HashMap<Uuid, Vec<ProductImage>> = HashMap::new();
        for image in images {
            by_product.entry(image.product_id).or_default().push(image);
        }
        for product in products.iter_mut() {
            product.images = by_product.remove(&product.id).unwrap_or_default();
        }
        Ok(())
    }

    async fn replace_images(tx: &mut Transaction<'_, Postgres>, product_id: Uuid, urls: &[String]) -> Result<Vec<ProductImage>, StoreError> {
        sqlx::query("DELETE FROM product_images WHERE product_id = $1").bind(product_id).execute(&mut **tx).await?;
        let mut images = Vec::with_capacity(urls.len());
        for (position, url) in urls.iter().enumerate() {
            let image = sqlx::query_as::<_, ProductImage>(
                "INSERT INTO product_images (id, product_id, url, position) VALUES ($1, $2, $3, $4) RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(url)
            .bind(position as i32)
            .fetch_one(&mut **tx)
            .await?;
            images.push(image);
        }
        Ok(images)
    }

    async fn insert_ledger_row(tx: &mut Transaction<'_, Postgres>, entry: &NewLoyaltyTransaction) -> Result<LoyaltyTransaction, StoreError> {
        let row = sqlx::query_as::<_, LoyaltyTransaction>(
            "INSERT INTO loyalty_transactions (id, user_id, order_id, points, type, description) VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(entry.user_id)
        .bind(entry.order_id)
        .bind(entry.points)
        .bind(entry.kind)
        .bind(&entry.description)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row)
    }

    /// Ledger row plus the matching move of the cached balance.
    async fn post_ledger(tx: &mut Transaction<'_, Postgres>, entry: &NewLoyaltyTransaction) -> Result<LoyaltyTransaction, StoreError> {
        let moved = sqlx::query("UPDATE profiles SET loyalty_points = loyalty_points + $2, updated_at = NOW() WHERE id = $1")
            .bind(entry.user_id)
            .bind(entry.points)
            .execute(&mut **tx)
            .await?;
        if moved.rows_affected() == 0 {
            return Err(StoreError::UnknownProfile(entry.user_id));
        }
        Self::insert_ledger_row(tx, entry).await
    }
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" WHERE TRUE");
    if filter.active_only { qb.push(" AND is_active"); }
    if let Some(category_id) = filter.category_id { qb.push(" AND category_id = ").push_bind(category_id); }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = search_pattern(search);
        qb.push(" AND (name ILIKE ").push_bind(pattern.clone()).push(" OR description ILIKE ").push_bind(pattern).push(")");
    }
    if let Some(min) = filter.min_price { qb.push(" AND price >= ").push_bind(min); }
    if let Some(max) = filter.max_price { qb.push(" AND price <= ").push_bind(max); }
    if filter.in_stock { qb.push(" AND stock_quantity > 0"); }
}

fn push_order_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = filter.user_id { qb.push(" AND user_id = ").push_bind(user_id); }
    if !filter.statuses.is_empty() {
        qb.push(" AND status IN (");
        let mut list = qb.separated(", ");
        for status in &filter.statuses { list.push_bind(*status); }
        list.push_unseparated(")");
    }
    if filter.b2b_only { qb.push(" AND is_b2b"); }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = search_pattern(search);
        qb.push(" AND (order_number ILIKE ").push_bind(pattern.clone()).push(" OR customer_email ILIKE ").push_bind(pattern).push(")");
    }
}

fn push_order_scope(qb: &mut QueryBuilder<'_, Postgres>, scope: &OrderScope) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = scope.user_id { qb.push(" AND user_id = ").push_bind(user_id); }
    if scope.b2b_only { qb.push(" AND is_b2b"); }
    if let Some(since) = scope.created_since { qb.push(" AND created_at >= ").push_bind(since); }
    if let Some(since) = scope.updated_since { qb.push(" AND updated_at >= ").push_bind(since); }
}

#[async_trait]
impl Store for PgStore {
    async fn profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn upsert_profile(&self, new: NewProfile) -> Result<Profile, StoreError> {
        let profile = sqlx::query_as::<_, Profile>(
            "INSERT INTO profiles (id, email, role, first_name, last_name) VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, role = EXCLUDED.role,
                first_name = COALESCE(EXCLUDED.first_name, profiles.first_name),
                last_name = COALESCE(EXCLUDED.last_name, profiles.last_name), updated_at = NOW()
             RETURNING *",
        )
        .bind(new.id)
        .bind(&new.email)
        .bind(new.role)
        .bind(new.first_name)
        .bind(new.last_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, format!("profile email '{}'", new.email)))?;
        Ok(profile)
    }

    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> Result<Option<Profile>, StoreError> {
        Ok(sqlx::query_as::<_, Profile>(
            "UPDATE profiles SET first_name = COALESCE($2, first_name), last_name = COALESCE($3, last_name),
                phone = COALESCE($4, phone), company_name = COALESCE($5, company_name),
                vat_number = COALESCE($6, vat_number), updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.phone)
        .bind(changes.company_name)
        .bind(changes.vat_number)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<Profile>, StoreError> {
        Ok(sqlx::query_as::<_, Profile>("UPDATE profiles SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM profiles WHERE TRUE");
        if !filter.roles.is_empty() {
            qb.push(" AND role IN (");
            let mut list = qb.separated(", ");
            for role in &filter.roles { list.push_bind(*role); }
            list.push_unseparated(")");
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = search_pattern(search);
            qb.push(" AND (email ILIKE ").push_bind(pattern.clone())
                .push(" OR first_name ILIKE ").push_bind(pattern.clone())
                .push(" OR last_name ILIKE ").push_bind(pattern.clone())
                .push(" OR company_name ILIKE ").push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY created_at DESC");
        Ok(qb.build_query_as::<Profile>().fetch_all(&self.pool).await?)
    }

    async fn price_list(&self, id: Uuid) -> Result<Option<PriceList>, StoreError> {
        Ok(sqlx::query_as::<_, PriceList>("SELECT id, name, discount_percentage FROM b2b_price_lists WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        let mut found: Vec<Product> = product.into_iter().collect();
        self.attach_images(&mut found).await?;
        Ok(found.pop())
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE slug = $1").bind(slug).fetch_optional(&self.pool).await?;
        let mut found: Vec<Product> = product.into_iter().collect();
        self.attach_images(&mut found).await?;
        Ok(found.pop())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError> {
        Ok(sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)").bind(ids).fetch_all(&self.pool).await?)
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_product_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM products");
        push_product_filters(&mut qb, filter);
        qb.push(match filter.sort {
            ProductSort::Name => " ORDER BY name ASC",
            ProductSort::PriceAsc => " ORDER BY price ASC, name ASC",
            ProductSort::PriceDesc => " ORDER BY price DESC, name ASC",
            ProductSort::Newest => " ORDER BY created_at DESC",
        });
        qb.push(" LIMIT ").push_bind(filter.page.limit()).push(" OFFSET ").push_bind(filter.page.offset());
        let mut data = qb.build_query_as::<Product>().fetch_all(&self.pool).await?;
        self.attach_images(&mut data).await?;
        Ok(Page { data, total, page: filter.page.page, per_page: filter.page.per_page })
    }

    async fn inventory(&self) -> Result<Vec<Product>, StoreError> {
        Ok(sqlx::query_as::<_, Product>("SELECT * FROM products WHERE is_active ORDER BY stock_quantity ASC, name ASC")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_product(&self, input: ProductInput) -> Result<Product, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut product = sqlx::query_as::<_, Product>(
            "INSERT INTO products (id, slug, name, description, short_description, price, compare_at_price, cost_price,
                sku, barcode, stock_quantity, low_stock_threshold, category_id, is_active, is_featured, weight,
                meta_title, meta_description)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&input.slug)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.short_description)
        .bind(input.price)
        .bind(input.compare_at_price)
        .bind(input.cost_price)
        .bind(&input.sku)
        .bind(&input.barcode)
        .bind(input.stock_quantity)
        .bind(input.low_stock_threshold)
        .bind(input.category_id)
        .bind(input.is_active)
        .bind(input.is_featured)
        .bind(input.weight)
        .bind(&input.meta_title)
        .bind(&input.meta_description)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, format!("product slug or sku '{}'", input.slug)))?;

        if let Some(urls) = &input.images {
            product.images = Self::replace_images(&mut tx, product.id, urls).await?;
        }
        tx.commit().await?;
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, input: ProductInput) -> Result<Option<Product>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query_as::<_, Product>(
            "UPDATE products SET slug = $2, name = $3, description = $4, short_description = $5, price = $6,
                compare_at_price = $7, cost_price = $8, sku = $9, barcode = $10, stock_quantity = $11,
                low_stock_threshold = $12, category_id = $13, is_active = $14, is_featured = $15, weight = $16,
                meta_title = $17, meta_description = $18, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&input.slug)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.short_description)
        .bind(input.price)
        .bind(input.compare_at_price)
        .bind(input.cost_price)
        .bind(&input.sku)
        .bind(&input.barcode)
        .bind(input.stock_quantity)
        .bind(input.low_stock_threshold)
        .bind(input.category_id)
        .bind(input.is_active)
        .bind(input.is_featured)
        .bind(input.weight)
        .bind(&input.meta_title)
        .bind(&input.meta_description)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, format!("product slug or sku '{}'", input.slug)))?;

        let Some(mut product) = updated else { return Ok(None) };
        let replaced = match &input.images {
            Some(urls) => Some(Self::replace_images(&mut tx, id, urls).await?),
            None => None,
        };
        tx.commit().await?;
        match replaced {
            Some(images) => product.images = images,
            None => self.attach_images(std::slice::from_mut(&mut product)).await?,
        }
        Ok(Some(product))
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_stock(&self, id: Uuid, stock_quantity: i32) -> Result<Option<Product>, StoreError> {
        Ok(sqlx::query_as::<_, Product>("UPDATE products SET stock_quantity = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(stock_quantity)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn categories(&self, active_only: bool) -> Result<Vec<Category>, StoreError> {
        Ok(sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE ($1 = FALSE OR is_active) ORDER BY position, name")
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?)
    }

    #[tracing::instrument(skip(self, new), fields(order_number = %new.order_number))]
    async fn place_order(&self, new: NewOrder) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(
            "INSERT INTO orders (id, order_number, user_id, guest_email, customer_email, customer_first_name,
                customer_last_name, customer_phone, shipping_street, shipping_house_number, shipping_postal_code,
                shipping_city, shipping_country, billing_street, billing_house_number, billing_postal_code,
                billing_city, billing_country, subtotal, tax, shipping_cost, total, loyalty_points_earned, notes, is_b2b)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21,
                $22, $23, $24, $25)
             RETURNING *",
        )
        .bind(new.id)
        .bind(&new.order_number)
        .bind(new.user_id)
        .bind(&new.guest_email)
        .bind(&new.customer.email)
        .bind(&new.customer.first_name)
        .bind(&new.customer.last_name)
        .bind(&new.customer.phone)
        .bind(&new.shipping.street)
        .bind(&new.shipping.house_number)
        .bind(&new.shipping.postal_code)
        .bind(&new.shipping.city)
        .bind(&new.shipping.country)
        .bind(&new.billing.street)
        .bind(&new.billing.house_number)
        .bind(&new.billing.postal_code)
        .bind(&new.billing.city)
        .bind(&new.billing.country)
        .bind(new.totals.subtotal)
        .bind(new.totals.tax)
        .bind(new.totals.shipping_cost)
        .bind(new.totals.total)
        .bind(new.loyalty_points_earned)
        .bind(&new.notes)
        .bind(new.is_b2b)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, format!("order number '{}'", new.order_number)))?;

        let mut wanted: BTreeMap<Uuid, i32> = BTreeMap::new();
        for item in &new.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, product_name, product_sku, quantity, price, total)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(Uuid::new_v4())
            .bind(order.id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(&item.product_sku)
            .bind(item.quantity)
            .bind(item.price)
            .bind(item.total())
            .execute(&mut *tx)
            .await
            .map_err(|e| out_of_range_or(e, format!("order item {}", item.product_name)))?;
            let total = wanted.entry(item.product_id).or_default();
            *total = total.checked_add(item.quantity).ok_or(StoreError::InsufficientStock(item.product_id))?;
        }

        // Sorted ids keep row locks in a stable order across concurrent checkouts.
        for (product_id, quantity) in wanted {
            let result = sqlx::query(
                "UPDATE products SET stock_quantity = stock_quantity - $2, updated_at = NOW() WHERE id = $1 AND stock_quantity >= $2",
            )
            .bind(product_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::InsufficientStock(product_id));
            }
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn attach_payment_session(&self, order_id: Uuid, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE orders SET payment_session_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn order_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE payment_intent_id = $1")
            .bind(payment_intent_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        Ok(sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY product_name")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Page<Order>, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_order_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM orders");
        push_order_filters(&mut qb, filter);
        qb.push(if filter.oldest_first { " ORDER BY created_at ASC" } else { " ORDER BY created_at DESC" });
        qb.push(" LIMIT ").push_bind(filter.page.limit()).push(" OFFSET ").push_bind(filter.page.offset());
        let data = qb.build_query_as::<Order>().fetch_all(&self.pool).await?;
        Ok(Page { data, total, page: filter.page.page, per_page: filter.page.per_page })
    }

    async fn set_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Option<Order>, StoreError> {
        Ok(sqlx::query_as::<_, Order>("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn order_summary(&self, scope: &OrderScope) -> Result<OrderSummary, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT status, COUNT(*) AS orders, COUNT(*) FILTER (WHERE payment_status = 'paid') AS paid,
                COALESCE(SUM(total) FILTER (WHERE payment_status = 'paid'), 0) AS revenue
             FROM orders",
        );
        push_order_scope(&mut qb, scope);
        qb.push(" GROUP BY status");
        let rows: Vec<(OrderStatus, i64, i64, Decimal)> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut summary = OrderSummary::default();
        for (status, orders, paid, revenue) in rows {
            summary.total_orders += orders;
            summary.paid_orders += paid;
            summary.paid_revenue += revenue;
            summary.by_status.insert(status, orders);
        }
        Ok(summary)
    }

    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.kind))]
    async fn apply_payment_event(&self, event: &WebhookEvent, order_id: Uuid) -> Result<EventOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query(
            "INSERT INTO processed_webhook_events (event_id, event_type, order_id) VALUES ($1, $2, $3) ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(&event.id)
        .bind(&event.kind)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
        if recorded.rows_affected() == 0 {
            return Ok(EventOutcome::Duplicate);
        }

        let Some(mut order) = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(EventOutcome::OrderMissing);
        };

        let reconciliation = order.reconcile(&event.event);
        if let Some(update) = &reconciliation.update {
            order = sqlx::query_as::<_, Order>(
                "UPDATE orders SET status = COALESCE($2, status), payment_status = COALESCE($3, payment_status),
                    payment_intent_id = COALESCE($4, payment_intent_id), updated_at = NOW()
                 WHERE id = $1 RETURNING *",
            )
            .bind(order_id)
            .bind(update.status)
            .bind(update.payment_status)
            .bind(&update.payment_intent_id)
            .fetch_one(&mut *tx)
            .await?;
        }
        for entry in &reconciliation.ledger {
            Self::post_ledger(&mut tx, entry).await?;
        }

        tx.commit().await?;
        Ok(EventOutcome::Applied { order, reconciliation })
    }

    async fn append_loyalty(&self, entry: NewLoyaltyTransaction) -> Result<LoyaltyTransaction, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = Self::post_ledger(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn redeem_reward(&self, user_id: Uuid, reward: &LoyaltyReward) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let balance: Option<i64> = sqlx::query_scalar(
            "UPDATE profiles SET loyalty_points = loyalty_points - $2, updated_at = NOW()
             WHERE id = $1 AND loyalty_points >= $2 RETURNING loyalty_points",
        )
        .bind(user_id)
        .bind(reward.points_required)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance) = balance else {
            let exists: Option<i64> = sqlx::query_scalar("SELECT loyalty_points FROM profiles WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(if exists.is_some() { StoreError::InsufficientPoints } else { StoreError::UnknownProfile(user_id) });
        };

        Self::insert_ledger_row(&mut tx, &NewLoyaltyTransaction::redeemed(user_id, reward)).await?;
        tx.commit().await?;
        Ok(balance)
    }

    async fn loyalty_history(&self, user_id: Uuid) -> Result<Vec<LoyaltyTransaction>, StoreError> {
        Ok(sqlx::query_as::<_, LoyaltyTransaction>("SELECT * FROM loyalty_transactions WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn reward(&self, id: Uuid) -> Result<Option<LoyaltyReward>, StoreError> {
        Ok(sqlx::query_as::<_, LoyaltyReward>("SELECT * FROM loyalty_rewards WHERE id = $1 AND is_active")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn rewards(&self) -> Result<Vec<LoyaltyReward>, StoreError> {
        Ok(sqlx::query_as::<_, LoyaltyReward>("SELECT * FROM loyalty_rewards WHERE is_active ORDER BY points_required")
            .fetch_all(&self.pool)
            .await?)
    }
}
