//! Runtime configuration, read from the environment (a `.env` file is loaded first).

use std::time::Duration;
use thiserror::Error;

use crate::domain::aggregates::{DEFAULT_CART_CAPACITY, DEFAULT_CART_TTL};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// No database means the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    /// Public storefront origin used for payment redirect URLs.
    pub app_url: String,
    pub currency: String,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
    /// Bootstrap of the first admin is disabled when unset.
    pub setup_secret_key: Option<String>,
    /// Most visitor carts held in memory at once.
    pub cart_capacity: usize,
    pub cart_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid { name: "PORT", value: v })?,
            None => 8083,
        };
        let database_max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid { name: "DATABASE_MAX_CONNECTIONS", value: v })?,
            None => 10,
        };
        let cart_capacity = match get("CART_CAPACITY") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid { name: "CART_CAPACITY", value: v })?,
            None => DEFAULT_CART_CAPACITY,
        };
        let cart_ttl = match get("CART_TTL_SECS") {
            Some(v) => Duration::from_secs(v.parse().map_err(|_| ConfigError::Invalid { name: "CART_TTL_SECS", value: v })?),
            None => DEFAULT_CART_TTL,
        };

        Ok(Self {
            port,
            database_url: get("DATABASE_URL"),
            database_max_connections,
            nats_url: get("NATS_URL"),
            app_url: get("APP_URL").unwrap_or_else(|| "http://localhost:3000".into()).trim_end_matches('/').to_string(),
            currency: get("CURRENCY").unwrap_or_else(|| "eur".into()).to_lowercase(),
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            jwt_secret: get("AUTH_JWT_SECRET").ok_or(ConfigError::Missing("AUTH_JWT_SECRET"))?,
            jwt_audience: get("AUTH_JWT_AUDIENCE"),
            setup_secret_key: get("SETUP_SECRET_KEY"),
            cart_capacity,
            cart_ttl,
        })
    }

    /// Config for tests and local tooling; nothing external is configured.
    pub fn local(jwt_secret: impl Into<String>) -> Self {
        Self {
            port: 8083,
            database_url: None,
            database_max_connections: 10,
            nats_url: None,
            app_url: "http://localhost:3000".into(),
            currency: "eur".into(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            jwt_secret: jwt_secret.into(),
            jwt_audience: None,
            setup_secret_key: None,
            cart_capacity: DEFAULT_CART_CAPACITY,
            cart_ttl: DEFAULT_CART_TTL,
        }
    }
}
