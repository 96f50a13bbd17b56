//! OpenSASE Checkout - cart and checkout service

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_checkout::api::{router, AppState};
use opensase_checkout::config::Config;
use opensase_checkout::messaging::{EventPublisher, NatsPublisher, NoopPublisher};
use opensase_checkout::store::{PgStore, Stores};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::debug!(?config, "configuration loaded");

    let db = PgPoolOptions::new().max_connections(config.max_connections).connect(&config.database_url).await?;
    if config.run_migrations {
        sqlx::migrate!("./migrations").run(&db).await?;
    }

    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events will be dropped");
                Arc::new(NoopPublisher)
            }
        },
        None => Arc::new(NoopPublisher),
    };

    let stores = Stores::from_backend(Arc::new(PgStore::new(db)));
    let app = router(AppState::new(stores, events));

    let addr = config.socket_addr();
    tracing::info!("🚀 OpenSASE Checkout listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
