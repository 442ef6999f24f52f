//! Application State
//!
//! Shared handles cloned into every request.

use std::sync::Arc;

use crate::api::auth::TokenVerifier;
use crate::config::AppConfig;
use crate::domain::aggregates::{CartStore, MemoryCartStore};
use crate::domain::events::EventPublisher;
use crate::payments::PaymentProvider;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub carts: Arc<dyn CartStore>,
    /// Hosted payment sessions; `None` sends every order down the bank transfer path.
    pub payments: Option<Arc<dyn PaymentProvider>>,
    pub events: EventPublisher,
    pub tokens: Arc<TokenVerifier>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Store>) -> Self {
        let tokens = Arc::new(TokenVerifier::new(&config.jwt_secret, config.jwt_audience.as_deref()));
        Self {
            store,
            carts: Arc::new(MemoryCartStore::with_limits(config.cart_capacity, config.cart_ttl)),
            payments: None,
            events: EventPublisher::disabled(),
            tokens,
            config: Arc::new(config),
        }
    }

    pub fn with_payments(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.payments = Some(provider);
        self
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn with_carts(mut self, carts: Arc<dyn CartStore>) -> Self {
        self.carts = carts;
        self
    }
}
