use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use slotbook::config::AppConfig;
use slotbook::coordination::Coordinator;
use slotbook::db::Store;
use slotbook::handlers;
use slotbook::services::clock::{Clock, SystemClock};
use slotbook::services::generator;
use slotbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store = Store::open(&config.database_url)?;
    let facility = generator::ensure_default_facility(&store)?;
    generator::seed_days(&store, &facility, clock.now().date(), config.seed_days)?;

    let coordinator = Coordinator::connect(&config.redis_url, config.redis_connect_timeout).await;
    if !coordinator.is_available() {
        tracing::warn!("running without coordination: rate limiting and distributed locking disabled");
    }

    let state = Arc::new(AppState::new(config.clone(), store, coordinator, clock));
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
