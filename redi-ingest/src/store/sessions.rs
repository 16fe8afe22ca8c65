//! Upload session persistence
//!
//! Counters advance with atomic in-database increments so concurrent
//! status polls always see a consistent running total. Error samples are
//! written once, at finalization.

use crate::models::{SessionError, SessionStatus, UploadSession};
use chrono::{DateTime, Utc};
use redi_common::Result;
use sqlx::{Row, SqlitePool};

use super::properties::parse_utc;

/// Register a session row. Idempotent: the API layer creates the row
/// before handing off to the coordinator, which registers it again on
/// its own entry path.
pub async fn create_session(pool: &SqlitePool, session: &UploadSession) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO upload_sessions (upload_id, status, processed_count, error_count, errors, started_at)
        VALUES (?, ?, ?, ?, '[]', ?)
        ON CONFLICT(upload_id) DO NOTHING
        "#,
    )
    .bind(&session.upload_id)
    .bind(session.status.as_str())
    .bind(session.processed_count)
    .bind(session.error_count)
    .bind(session.started_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Atomically advance the session counters by the given deltas.
pub async fn increment_counts(
    pool: &SqlitePool,
    upload_id: &str,
    processed_delta: i64,
    error_delta: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE upload_sessions
        SET processed_count = processed_count + ?,
            error_count = error_count + ?
        WHERE upload_id = ?
        "#,
    )
    .bind(processed_delta)
    .bind(error_delta)
    .bind(upload_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Finalize a session exactly once: terminal status, captured error
/// samples, optional fatal message, end timestamp.
pub async fn finalize_session(
    pool: &SqlitePool,
    upload_id: &str,
    status: SessionStatus,
    errors: &[SessionError],
    error_message: Option<&str>,
) -> Result<()> {
    let errors_json = serde_json::to_string(errors)
        .map_err(|e| redi_common::Error::Internal(format!("Failed to serialize errors: {}", e)))?;

    sqlx::query(
        r#"
        UPDATE upload_sessions
        SET status = ?,
            errors = ?,
            error_message = ?,
            ended_at = ?
        WHERE upload_id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(errors_json)
    .bind(error_message)
    .bind(Utc::now().to_rfc3339())
    .bind(upload_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_session(pool: &SqlitePool, upload_id: &str) -> Result<Option<UploadSession>> {
    let row = sqlx::query(
        r#"
        SELECT upload_id, status, processed_count, error_count, errors,
               error_message, started_at, ended_at
        FROM upload_sessions
        WHERE upload_id = ?
        "#,
    )
    .bind(upload_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status_str: String = row.get("status");
    let status = SessionStatus::parse(&status_str).ok_or_else(|| {
        redi_common::Error::Internal(format!("Unknown session status: {}", status_str))
    })?;

    let errors_json: String = row.get("errors");
    let errors: Vec<SessionError> = serde_json::from_str(&errors_json)
        .map_err(|e| redi_common::Error::Internal(format!("Failed to deserialize errors: {}", e)))?;

    let started_at: String = row.get("started_at");
    let ended_at: Option<String> = row.get("ended_at");
    let ended_at: Option<DateTime<Utc>> = ended_at.map(|s| parse_utc(&s)).transpose()?;

    Ok(Some(UploadSession {
        upload_id: row.get("upload_id"),
        status,
        processed_count: row.get("processed_count"),
        error_count: row.get("error_count"),
        errors,
        error_message: row.get("error_message"),
        started_at: parse_utc(&started_at)?,
        ended_at,
    }))
}
