//! Fallback enrichment endpoint
//!
//! Runs a bounded cascade pass over the pending queue and returns the
//! run metrics. Synchronous by design: callers size the run with the
//! `limit` parameter instead of polling a background job.

use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::enrich::cascade::{FallbackCascade, RunReport};
use crate::store;
use crate::{ApiResult, AppState};

const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct EnrichParams {
    pub limit: Option<i64>,
    /// When false, previously enriched candidates are retried too
    pub skip_already_enriched: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct EnrichResponse {
    #[serde(flatten)]
    pub report: RunReport,
    pub success_rate: f64,
    pub avg_processing_ms: f64,
    pub remaining_pending: i64,
}

/// POST /fallback/enrich
pub async fn run_enrichment(
    State(state): State<AppState>,
    Query(params): Query<EnrichParams>,
) -> ApiResult<Json<EnrichResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 1000);
    let skip_already_enriched = params.skip_already_enriched.unwrap_or(true);

    let cascade = FallbackCascade::from_config(state.db.clone(), &state.config).await?;
    let report = cascade.run(limit, skip_already_enriched).await?;
    let remaining_pending = store::pending::count_pending(&state.db).await?;

    Ok(Json(EnrichResponse {
        success_rate: report.success_rate(),
        avg_processing_ms: report.avg_processing_ms(),
        report,
        remaining_pending,
    }))
}

/// Build fallback enrichment routes
pub fn fallback_routes() -> Router<AppState> {
    Router::new().route("/fallback/enrich", post(run_enrichment))
}
