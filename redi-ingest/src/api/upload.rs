//! CSV upload endpoints
//!
//! `POST /upload/unified` validates the header row synchronously and
//! hands the parsed stream to a background coordinator task; the
//! response carries the session id for polling. A missing required
//! column rejects the whole file before any row is processed.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use crate::ingest::coordinator::{new_upload_id, BatchCoordinator};
use crate::ingest::parse_csv;
use crate::models::UploadSession;
use crate::normalize::{missing_required_columns, OPTIONAL_COLUMNS, REQUIRED_COLUMNS};
use crate::{store, ApiError, ApiResult, AppState};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
pub struct UploadAccepted {
    pub upload_id: String,
    pub status: String,
    pub row_count: usize,
}

/// POST /upload/unified
pub async fn upload_unified(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<UploadAccepted>)> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Empty request body".to_string()));
    }

    let (headers, records) = parse_csv(&body)?;
    let missing = missing_required_columns(&headers);
    if !missing.is_empty() {
        return Err(ApiError::MissingColumns(
            missing.into_iter().map(String::from).collect(),
        ));
    }

    let upload_id = new_upload_id();
    let row_count = records.len();

    // Register the session before responding so a client polling right
    // after the 202 never sees a 404 for an id we just issued
    let session = UploadSession::new(upload_id.clone());
    store::sessions::create_session(&state.db, &session).await?;

    let cancel = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(upload_id.clone(), cancel.clone());

    let coordinator = BatchCoordinator::new(state.db.clone(), state.config.target_state.clone());
    let task_state = state.clone();
    let task_upload_id = upload_id.clone();
    tokio::spawn(async move {
        if let Err(e) = coordinator.run(&task_upload_id, records, cancel).await {
            tracing::error!(upload_id = %task_upload_id, error = %e, "Upload task failed");
        }
        task_state
            .cancellation_tokens
            .write()
            .await
            .remove(&task_upload_id);
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAccepted {
            upload_id,
            status: "processing".to_string(),
            row_count,
        }),
    ))
}

/// POST /upload/sessions/:id/cancel
///
/// Flags the session's token; the coordinator notices at the next batch
/// boundary.
pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let tokens = state.cancellation_tokens.read().await;
    let Some(token) = tokens.get(&upload_id) else {
        return Err(ApiError::NotFound(format!(
            "No active upload session: {}",
            upload_id
        )));
    };
    token.cancel();
    tracing::info!(upload_id = %upload_id, "Upload cancellation requested");
    Ok(Json(json!({ "upload_id": upload_id, "cancelled": true })))
}

/// GET /upload/requirements/unified
///
/// Publishes the alias tables so upstream tooling can pre-check files.
pub async fn upload_requirements() -> Json<serde_json::Value> {
    let required: Vec<_> = REQUIRED_COLUMNS
        .entries()
        .map(|(canonical, aliases)| json!({ "column": canonical, "aliases": aliases }))
        .collect();
    let optional: Vec<_> = OPTIONAL_COLUMNS
        .entries()
        .map(|(canonical, aliases)| json!({ "column": canonical, "aliases": aliases }))
        .collect();
    Json(json!({ "required": required, "optional": optional }))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/upload/unified", post(upload_unified))
        .route("/upload/sessions/:id/cancel", post(cancel_upload))
        .route("/upload/requirements/unified", get(upload_requirements))
}
