//! Storefront service entry point

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::domain::events::EventPublisher;
use storefront::payments::stripe::StripeClient;
use storefront::store::{MemoryStore, PgStore, Store};
use storefront::{api, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events disabled");
                None
            }
        },
        None => None,
    };

    let mut state = AppState::new(config.clone(), store).with_events(EventPublisher::new(nats));
    match &config.stripe_secret_key {
        Some(key) => state = state.with_payments(Arc::new(StripeClient::new(key.clone()))),
        None => tracing::warn!("STRIPE_SECRET_KEY not set, orders fall back to bank transfer"),
    }
    if config.stripe_webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set, payment webhooks will be rejected");
    }

    let app = api::router(state);
    tracing::info!("storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
