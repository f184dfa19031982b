//! One-Shield Ingest Server
//!
//! Serves the alert / incident API and watches the drop directory for new
//! exports.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oneshield_ingest::{
    config::Config,
    create_router,
    db,
    ingest::{scanner, FileLifecycle},
    service::RecordService,
    store::PgStore,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "oneshield_ingest=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("One-Shield Ingest starting ({})...", config.environment);
    tracing::info!("Database: {}", config.database_url.split('@').last().unwrap_or("***"));

    // Initialize database pool
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let files = FileLifecycle::new(&config.drop_dir, &config.processed_dir, &config.error_dir);
    std::fs::create_dir_all(files.drop_dir())
        .with_context(|| format!("Failed to create drop directory {}", files.drop_dir().display()))?;

    let service = Arc::new(RecordService::new(Arc::new(PgStore::new(pool)), files));

    // Background scanner
    match config.scan_interval() {
        Some(interval) => {
            tokio::spawn(scanner::run(service.clone(), interval));
        }
        None => tracing::info!("Drop directory scanner disabled"),
    }

    // Build application state
    let state = AppState {
        service,
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
