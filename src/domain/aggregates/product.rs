//! Product Aggregate

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::{Sku, Slug};
use crate::model::Product;

pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

impl Product {
    pub fn is_in_stock(&self) -> bool { self.stock_quantity > 0 }
    pub fn is_low_stock(&self) -> bool { self.stock_quantity <= self.low_stock_threshold }
}

/// Admin create/update payload. `images` replaces the image list when present.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub cost_price: Option<Decimal>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub stock_quantity: Option<i32>,
    pub low_stock_threshold: Option<i32>,
    pub category_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub weight: Option<Decimal>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub images: Option<Vec<String>>,
}

/// Normalized product fields ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductInput {
    pub name: String,
    pub slug: String,
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
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("invalid product: {0}")]
    Invalid(String),
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn non_negative(field: &str, value: Option<Decimal>) -> Result<Option<Decimal>, ProductError> {
    match value {
        Some(v) if v.is_sign_negative() && !v.is_zero() => Err(ProductError::Invalid(format!("{field} must not be negative"))),
        other => Ok(other),
    }
}

impl ProductRequest {
    pub fn into_input(self) -> Result<ProductInput, ProductError> {
        self.validate().map_err(|e| ProductError::Invalid(e.to_string()))?;
        let name = self.name.trim().to_string();
        if name.is_empty() { return Err(ProductError::Invalid("name is required".into())); }
        let slug = match non_blank(self.slug) {
            Some(s) => Slug::parse(&s),
            None => Slug::from_name(&name),
        }.map_err(|e| ProductError::Invalid(e.to_string()))?;
        let sku = non_blank(self.sku).map(Sku::new).transpose().map_err(|e| ProductError::Invalid(e.to_string()))?;
        let price = non_negative("price", Some(self.price))?.unwrap_or_default();
        let stock_quantity = self.stock_quantity.unwrap_or(0);
        if stock_quantity < 0 { return Err(ProductError::Invalid("stock_quantity must not be negative".into())); }
        let low_stock_threshold = self.low_stock_threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD).max(0);
        let images = self.images.map(|urls| urls.into_iter().map(|u| u.trim().to_string()).filter(|u| !u.is_empty()).collect());

        Ok(ProductInput {
            name,
            slug: slug.into_inner(),
            description: non_blank(self.description),
            short_description: non_blank(self.short_description),
            price,
            compare_at_price: non_negative("compare_at_price", self.compare_at_price)?,
            cost_price: non_negative("cost_price", self.cost_price)?,
            sku: sku.map(Sku::into_inner),
            barcode: non_blank(self.barcode),
            stock_quantity,
            low_stock_threshold,
            category_id: self.category_id,
            is_active: self.is_active.unwrap_or(true),
            is_featured: self.is_featured.unwrap_or(false),
            weight: non_negative("weight", self.weight)?,
            meta_title: non_blank(self.meta_title),
            meta_description: non_blank(self.meta_description),
            images,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> ProductRequest {
        serde_json::from_value(serde_json::json!({ "name": name, "price": "12.50" })).unwrap()
    }

    #[test]
    fn test_defaults_and_derived_slug() {
        let input = request("Silk Blindfold").into_input().unwrap();
        assert_eq!(input.slug, "silk-blindfold");
        assert_eq!(input.stock_quantity, 0);
        assert_eq!(input.low_stock_threshold, DEFAULT_LOW_STOCK_THRESHOLD);
        assert!(input.is_active);
        assert!(!input.is_featured);
        assert_eq!(input.images, None);
    }

    #[test]
    fn test_rejects_negative_values() {
        let mut r = request("Widget");
        r.price = Decimal::new(-1, 0);
        assert!(r.into_input().is_err());
        let mut r = request("Widget");
        r.stock_quantity = Some(-3);
        assert!(r.into_input().is_err());
    }

    #[test]
    fn test_rejects_blank_name_and_bad_slug() {
        assert!(request("   ").into_input().is_err());
        let mut r = request("Widget");
        r.slug = Some("Not A Slug".into());
        assert!(r.into_input().is_err());
    }

    #[test]
    fn test_sku_is_normalized() {
        let mut r = request("Widget");
        r.sku = Some(" wid-01 ".into());
        assert_eq!(r.into_input().unwrap().sku.as_deref(), Some("WID-01"));
    }
}
