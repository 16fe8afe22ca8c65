//! redi-ingest library interface
//!
//! Real-estate data ingestion: CSV upload sessions, row decomposition
//! into linked entities, natural-key merge persistence, and the
//! fallback APN enrichment cascade.

pub mod api;
pub mod decompose;
pub mod enrich;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod life_events;
pub mod models;
pub mod normalize;
pub mod store;
pub mod validators;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use redi_common::config::ServiceConfig;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Service configuration (target jurisdiction, lookup endpoints)
    pub config: Arc<ServiceConfig>,
    /// Cancellation tokens for in-flight upload sessions, keyed by
    /// upload id
    pub cancellation_tokens: Arc<RwLock<HashMap<String, CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ServiceConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::upload_routes())
        .merge(api::session_routes())
        .merge(api::property_routes())
        .merge(api::fallback_routes())
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
