//! Role dashboards. Read-only aggregates over the store.

use axum::{extract::State, Json};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::auth::{CurrentUser, ADMIN, B2B, CUSTOMER, STAFF};
use crate::domain::aggregates::next_reward_threshold;
use crate::model::{Order, OrderStatus, Product, Profile};
use crate::store::{OrderFilter, OrderScope, Pagination, ProductFilter, ProfileFilter};
use crate::{AppState, Result};

const RECENT_ORDERS: u32 = 5;
const LOW_STOCK_ITEMS: usize = 5;
const WORK_QUEUE: u32 = 10;

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    midnight(now.date_naive())
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    midnight(NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today))
}

async fn recent_orders(s: &AppState, filter: OrderFilter) -> Result<Vec<Order>> {
    let filter = OrderFilter { page: Pagination::first(RECENT_ORDERS), ..filter };
    Ok(s.store.list_orders(&filter).await?.data)
}

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub total_products: i64,
    pub total_orders: i64,
    pub total_users: usize,
    pub total_revenue: Decimal,
    pub average_order_value: Decimal,
    pub pending_orders: i64,
    pub processing_orders: i64,
    pub recent_orders: Vec<Order>,
}

pub async fn admin(State(s): State<AppState>, user: CurrentUser) -> Result<Json<AdminDashboard>> {
    user.require(ADMIN)?;
    let products = s.store.list_products(&ProductFilter { active_only: true, page: Pagination::first(1), ..Default::default() }).await?;
    let summary = s.store.order_summary(&OrderScope::default()).await?;
    let users = s.store.list_profiles(&ProfileFilter::default()).await?;
    Ok(Json(AdminDashboard {
        total_products: products.total,
        total_orders: summary.total_orders,
        total_users: users.len(),
        total_revenue: summary.paid_revenue,
        average_order_value: summary.average_paid_order(),
        pending_orders: summary.count(OrderStatus::Pending),
        processing_orders: summary.count(OrderStatus::Processing),
        recent_orders: recent_orders(&s, OrderFilter::default()).await?,
    }))
}

#[derive(Debug, Serialize)]
pub struct EmployeeDashboard {
    pub pending_orders: i64,
    pub paid_orders: i64,
    pub processing_orders: i64,
    pub shipped_today: i64,
    pub low_stock_products: Vec<Product>,
    pub orders_to_process: Vec<Order>,
}

pub async fn employee(State(s): State<AppState>, user: CurrentUser) -> Result<Json<EmployeeDashboard>> {
    user.require(STAFF)?;
    let summary = s.store.order_summary(&OrderScope::default()).await?;
    let today = s.store.order_summary(&OrderScope { updated_since: Some(start_of_day(Utc::now())), ..Default::default() }).await?;
    let low_stock_products = s.store.inventory().await?.into_iter().filter(Product::is_low_stock).take(LOW_STOCK_ITEMS).collect();
    let queue = OrderFilter {
        statuses: vec![OrderStatus::Paid, OrderStatus::Processing],
        oldest_first: true,
        page: Pagination::first(WORK_QUEUE),
        ..Default::default()
    };
    Ok(Json(EmployeeDashboard {
        pending_orders: summary.count(OrderStatus::Pending),
        paid_orders: summary.count(OrderStatus::Paid),
        processing_orders: summary.count(OrderStatus::Processing),
        shipped_today: today.count(OrderStatus::Shipped),
        low_stock_products,
        orders_to_process: s.store.list_orders(&queue).await?.data,
    }))
}

#[derive(Debug, Serialize)]
pub struct B2bDashboard {
    pub profile: Profile,
    pub price_list: Option<String>,
    pub discount_percentage: Decimal,
    pub recent_orders: Vec<Order>,
    pub total_orders: i64,
    pub open_orders: i64,
    pub spent_this_month: Decimal,
}

pub async fn b2b(State(s): State<AppState>, user: CurrentUser) -> Result<Json<B2bDashboard>> {
    let profile = user.require(B2B)?.clone();
    let price_list = match profile.b2b_price_list_id {
        Some(id) => s.store.price_list(id).await?,
        None => None,
    };
    let scope = OrderScope { user_id: Some(profile.id), b2b_only: true, ..Default::default() };
    let summary = s.store.order_summary(&scope).await?;
    let month = s.store.order_summary(&OrderScope { created_since: Some(start_of_month(Utc::now())), ..scope }).await?;
    let recent = recent_orders(&s, OrderFilter { user_id: Some(profile.id), b2b_only: true, ..Default::default() }).await?;
    Ok(Json(B2bDashboard {
        discount_percentage: price_list.as_ref().map_or(Decimal::ZERO, |l| l.discount_percentage),
        price_list: price_list.map(|l| l.name),
        recent_orders: recent,
        total_orders: summary.total_orders,
        open_orders: summary.count(OrderStatus::Pending) + summary.count(OrderStatus::Processing),
        spent_this_month: month.paid_revenue,
        profile,
    }))
}

#[derive(Debug, Serialize)]
pub struct ConsumerDashboard {
    pub profile: Profile,
    pub recent_orders: Vec<Order>,
    pub total_orders: i64,
    pub total_spent: Decimal,
    pub loyalty_points: i64,
    pub next_reward_at: i64,
}

pub async fn consumer(State(s): State<AppState>, user: CurrentUser) -> Result<Json<ConsumerDashboard>> {
    let profile = user.require(CUSTOMER)?.clone();
    let summary = s.store.order_summary(&OrderScope { user_id: Some(profile.id), ..Default::default() }).await?;
    let recent = recent_orders(&s, OrderFilter { user_id: Some(profile.id), ..Default::default() }).await?;
    Ok(Json(ConsumerDashboard {
        recent_orders: recent,
        total_orders: summary.total_orders,
        total_spent: summary.paid_revenue,
        loyalty_points: profile.loyalty_points,
        next_reward_at: next_reward_threshold(profile.loyalty_points),
        profile,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_boundaries() {
        let now = Utc.with_ymd_and_hms(2024, 3, 17, 15, 42, 9).unwrap();
        assert_eq!(start_of_day(now), Utc.with_ymd_and_hms(2024, 3, 17, 0, 0, 0).unwrap());
        assert_eq!(start_of_month(now), Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }
}
