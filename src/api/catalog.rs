//! Public catalog routes.

use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::QueryParams;
use crate::model::{Category, Product};
use crate::store::{Page, Pagination, ProductFilter, ProductSort};
use crate::{AppState, Result, StorefrontError};

#[derive(Debug, Default, Deserialize)]
pub struct ProductParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<Uuid>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub sort: ProductSort,
}

impl ProductParams {
    pub fn into_filter(self, active_only: bool) -> ProductFilter {
        ProductFilter {
            active_only,
            category_id: self.category,
            search: self.search,
            min_price: self.min_price,
            max_price: self.max_price,
            in_stock: self.in_stock,
            sort: self.sort,
            page: Pagination::new(self.page, self.per_page),
        }
    }
}

pub async fn list_products(State(s): State<AppState>, QueryParams(p): QueryParams<ProductParams>) -> Result<Json<Page<Product>>> {
    Ok(Json(s.store.list_products(&p.into_filter(true)).await?))
}

pub async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    s.store.product(id).await?.filter(|p| p.is_active).map(Json).ok_or(StorefrontError::NotFound("Product"))
}

pub async fn get_product_by_slug(State(s): State<AppState>, Path(slug): Path<String>) -> Result<Json<Product>> {
    s.store.product_by_slug(&slug).await?.filter(|p| p.is_active).map(Json).ok_or(StorefrontError::NotFound("Product"))
}

pub async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(s.store.categories(true).await?))
}
