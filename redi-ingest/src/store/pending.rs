//! Pending-repair queue persistence
//!
//! Rows land here when decomposition cannot produce a usable identifier
//! or zip. The fallback cascade reads APN-repairable entries, records
//! every attempt, and deletes an entry only after a successful
//! re-ingest.

use crate::models::{EnrichmentStatus, PendingCandidate, PendingReason, RawRecord};
use chrono::{DateTime, Utc};
use redi_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::properties::parse_utc;

pub async fn insert_candidate(
    pool: &SqlitePool,
    raw_row: &RawRecord,
    reason: PendingReason,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let raw = serde_json::to_string(raw_row)
        .map_err(|e| redi_common::Error::Internal(format!("Failed to serialize raw row: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO pending_candidates (id, raw_row, reason, status, created_at)
        VALUES (?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(id.to_string())
    .bind(raw)
    .bind(reason.as_str())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(id)
}

/// Candidates the cascade can work on: APN problems only (zip problems
/// need the source fixed, not a lookup). With `skip_already_enriched`,
/// entries already resolved by an earlier run are excluded.
pub async fn list_enrichable(
    pool: &SqlitePool,
    limit: i64,
    skip_already_enriched: bool,
) -> Result<Vec<PendingCandidate>> {
    let status_filter = if skip_already_enriched {
        "AND status IN ('pending', 'failed', 'error')"
    } else {
        ""
    };
    let sql = format!(
        r#"
        SELECT id, raw_row, reason, status, created_at,
               enrichment_method, enrichment_confidence, enrichment_apn,
               attempted_at, processing_time_ms, error
        FROM pending_candidates
        WHERE reason IN ('missing_apn', 'apn_not_numeric_or_too_short')
        {status_filter}
        ORDER BY created_at
        LIMIT ?
        "#
    );

    let rows = sqlx::query(&sql).bind(limit).fetch_all(pool).await?;
    rows.into_iter().map(candidate_from_row).collect()
}

pub async fn get_candidate(pool: &SqlitePool, id: Uuid) -> Result<Option<PendingCandidate>> {
    let row = sqlx::query(
        r#"
        SELECT id, raw_row, reason, status, created_at,
               enrichment_method, enrichment_confidence, enrichment_apn,
               attempted_at, processing_time_ms, error
        FROM pending_candidates
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(candidate_from_row).transpose()
}

/// Record the outcome of one enrichment attempt.
#[allow(clippy::too_many_arguments)]
pub async fn record_attempt(
    pool: &SqlitePool,
    id: Uuid,
    status: EnrichmentStatus,
    method: Option<&str>,
    confidence: Option<f64>,
    apn: Option<&str>,
    processing_time_ms: i64,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE pending_candidates
        SET status = ?,
            enrichment_method = ?,
            enrichment_confidence = ?,
            enrichment_apn = ?,
            attempted_at = ?,
            processing_time_ms = ?,
            error = ?
        WHERE id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(method)
    .bind(confidence)
    .bind(apn)
    .bind(Utc::now().to_rfc3339())
    .bind(processing_time_ms)
    .bind(error)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_candidate(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM pending_candidates WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_pending(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_candidates")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn candidate_from_row(row: sqlx::sqlite::SqliteRow) -> Result<PendingCandidate> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| redi_common::Error::Internal(format!("Failed to parse candidate id: {}", e)))?;

    let raw: String = row.get("raw_row");
    let raw_row: RawRecord = serde_json::from_str(&raw)
        .map_err(|e| redi_common::Error::Internal(format!("Failed to deserialize raw row: {}", e)))?;

    let reason_str: String = row.get("reason");
    let reason = PendingReason::parse(&reason_str).ok_or_else(|| {
        redi_common::Error::Internal(format!("Unknown pending reason: {}", reason_str))
    })?;

    let status_str: String = row.get("status");
    let status = EnrichmentStatus::parse(&status_str).ok_or_else(|| {
        redi_common::Error::Internal(format!("Unknown enrichment status: {}", status_str))
    })?;

    let created_at: String = row.get("created_at");
    let attempted_at: Option<String> = row.get("attempted_at");
    let attempted_at: Option<DateTime<Utc>> =
        attempted_at.map(|s| parse_utc(&s)).transpose()?;

    Ok(PendingCandidate {
        id,
        raw_row,
        reason,
        status,
        created_at: parse_utc(&created_at)?,
        enrichment_method: row.get("enrichment_method"),
        enrichment_confidence: row.get("enrichment_confidence"),
        enrichment_apn: row.get("enrichment_apn"),
        attempted_at,
        processing_time_ms: row.get("processing_time_ms"),
        error: row.get("error"),
    })
}
