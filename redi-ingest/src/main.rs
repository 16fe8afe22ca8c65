//! redi-ingest - Real Estate Data Ingest service
//!
//! Accepts unified CSV uploads, decomposes rows into linked
//! property/owner/phone/life-event entities, merges them into SQLite,
//! and repairs identifier-less rows through the fallback enrichment
//! cascade.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use redi_ingest::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting redi-ingest (Real Estate Data Ingest)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = redi_common::config::ServiceConfig::load()?;
    info!("Target jurisdiction: {}", config.target_state);
    info!("Database: {}", config.database_path.display());

    let db_pool = redi_ingest::store::init_pool(&config.database_path).await?;
    info!("Database connection established");

    let bind_address = config.bind_address.clone();
    let state = AppState::new(db_pool, config);
    let app = redi_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
