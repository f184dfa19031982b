//! One-Shield Ingest
//!
//! Normalizes alert / incident CSV exports and keeps every alert linked to
//! the incident whose time window contains it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     ONE-SHIELD INGEST                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  drop dir ──► scanner ─┐        ┌─────────────┐             │
//! │                        ├──────► │ RecordService│             │
//! │  HTTP API (Axum) ──────┘        └──────┬──────┘             │
//! │                          normalize ◄───┤───► reconcile       │
//! │                                        ▼                     │
//! │                               RecordStore (PostgreSQL)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};

pub use error::{AppError, AppResult};
use service::RecordService;
use store::RecordStore;

/// Shared application state
pub struct AppState<S> {
    pub service: Arc<RecordService<S>>,
    pub config: config::Config,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            config: self.config.clone(),
        }
    }
}

/// Create the main router with all routes
pub fn create_router<S: RecordStore>(state: AppState<S>) -> Router {
    let api_routes = Router::new()
        // Alerts
        .route("/api/v1/alerts", post(handlers::alerts::create::<S>))
        .route(
            "/api/v1/alerts/:id",
            get(handlers::alerts::get::<S>)
                .put(handlers::alerts::update::<S>)
                .delete(handlers::alerts::delete::<S>),
        )

        // Incidents
        .route("/api/v1/incidents", post(handlers::incidents::create::<S>))
        .route(
            "/api/v1/incidents/:id",
            get(handlers::incidents::get::<S>)
                .put(handlers::incidents::update::<S>)
                .delete(handlers::incidents::delete::<S>),
        )
        .route("/api/v1/incidents/:id/alerts", get(handlers::incidents::alerts::<S>))

        // Ingest & reconciliation
        .route("/api/v1/ingest", post(handlers::ingest::ingest::<S>))
        .route("/api/v1/reconcile/:user", post(handlers::ingest::reconcile_user::<S>));

    Router::new()
        .route("/health", get(handlers::health::check::<S>))
        .merge(api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
