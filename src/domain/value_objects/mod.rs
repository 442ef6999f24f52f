//! Value Objects for the storefront

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkuError {
    #[error("SKU empty")]
    Empty,
    #[error("SKU too long")]
    TooLong,
}

/// URL-safe product/category identifier: lowercase ascii letters, digits and single dashes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug(String);

impl Slug {
    pub fn parse(value: &str) -> Result<Self, SlugError> {
        let value = value.trim();
        if value.is_empty() { return Err(SlugError::Empty); }
        if value.len() > 120 { return Err(SlugError::TooLong); }
        let valid = value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !value.starts_with('-') && !value.ends_with('-') && !value.contains("--");
        if !valid { return Err(SlugError::Invalid(value.to_string())); }
        Ok(Self(value.to_string()))
    }

    /// Derives a slug from a display name ("Rose Massage Oil 50ml" -> "rose-massage-oil-50ml").
    pub fn from_name(name: &str) -> Result<Self, SlugError> {
        let mut slug = String::with_capacity(name.len());
        for c in name.trim().chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        }
        while slug.ends_with('-') { slug.pop(); }
        Self::parse(&slug)
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    #[error("slug empty")]
    Empty,
    #[error("slug too long")]
    TooLong,
    #[error("slug '{0}' is not URL-safe")]
    Invalid(String),
}

/// Rounds to whole cents, half away from zero.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Amount in minor units (cents) as payment providers expect it.
pub fn minor_units(amount: Decimal) -> i64 {
    (round_cents(amount) * Decimal::ONE_HUNDRED).to_i64().unwrap_or(0)
}

/// One point per whole euro; fractions are dropped and negatives yield zero.
pub fn whole_points(amount: Decimal) -> i64 {
    amount.floor().to_i64().unwrap_or(0).max(0)
}
