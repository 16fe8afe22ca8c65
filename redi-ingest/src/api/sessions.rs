//! Upload session inspection endpoints

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::UploadSession;
use crate::store;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub upload_id: String,
    pub status: String,
    pub processed_count: i64,
    pub error_count: i64,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionReportResponse {
    pub upload_id: String,
    pub status: String,
    pub processed_count: i64,
    pub error_count: i64,
    /// Captured error samples bucketed by error type
    pub error_histogram: BTreeMap<String, usize>,
    pub captured_errors: usize,
}

async fn load_session(state: &AppState, upload_id: &str) -> ApiResult<UploadSession> {
    store::sessions::get_session(&state.db, upload_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Unknown upload session: {}", upload_id)))
}

/// GET /upload/sessions/:id
pub async fn session_status(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<SessionStatusResponse>> {
    let session = load_session(&state, &upload_id).await?;
    Ok(Json(SessionStatusResponse {
        upload_id: session.upload_id,
        status: session.status.as_str().to_string(),
        processed_count: session.processed_count,
        error_count: session.error_count,
        started_at: session.started_at.to_rfc3339(),
        ended_at: session.ended_at.map(|dt| dt.to_rfc3339()),
        error_message: session.error_message,
    }))
}

/// GET /upload/sessions/:id/report
pub async fn session_report(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<SessionReportResponse>> {
    let session = load_session(&state, &upload_id).await?;
    Ok(Json(SessionReportResponse {
        upload_id: session.upload_id.clone(),
        status: session.status.as_str().to_string(),
        processed_count: session.processed_count,
        error_count: session.error_count,
        error_histogram: session.error_histogram(),
        captured_errors: session.errors.len(),
    }))
}

/// GET /upload/sessions/:id/error_rows.csv
///
/// Re-exports the captured failed rows so they can be fixed and
/// re-uploaded. Columns are the union of every failed row's columns, in
/// first-appearance order, prefixed with the error bookkeeping fields.
pub async fn session_error_rows(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Response> {
    let session = load_session(&state, &upload_id).await?;

    let mut columns: Vec<String> = Vec::new();
    for error in &session.errors {
        for (column, _) in error.raw_row.iter() {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header: Vec<&str> = vec!["row_number", "error_type", "error_message"];
    header.extend(columns.iter().map(|c| c.as_str()));
    writer
        .write_record(&header)
        .map_err(|e| ApiError::Internal(format!("Failed to write CSV header: {}", e)))?;

    for error in &session.errors {
        let row_number = error.row.to_string();
        let mut record: Vec<&str> = vec![&row_number, &error.error_type, &error.message];
        for column in &columns {
            record.push(error.raw_row.get(column).unwrap_or(""));
        }
        writer
            .write_record(&record)
            .map_err(|e| ApiError::Internal(format!("Failed to write CSV row: {}", e)))?;
    }

    let body = writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("Failed to finish CSV: {}", e)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}_error_rows.csv\"", upload_id),
            ),
        ],
        body,
    )
        .into_response())
}

/// Build session inspection routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/upload/sessions/:id", get(session_status))
        .route("/upload/sessions/:id/report", get(session_report))
        .route("/upload/sessions/:id/error_rows.csv", get(session_error_rows))
}
