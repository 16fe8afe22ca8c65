//! Batch coordinator
//!
//! Drives one upload session: fixed-size batches, per-row routing
//! through the decomposer, counter updates after every batch, and
//! exactly one finalization. A row error never aborts the stream; only
//! a fatal error (or cancellation) ends a session early.

use crate::decompose::{Decomposer, RowOutcome};
use crate::models::{
    RawRecord, SessionError, SessionStatus, UploadSession, MAX_CAPTURED_ERRORS,
};
use crate::store;
use chrono::Utc;
use redi_common::Result;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

/// Rows per batch.
pub const BATCH_SIZE: usize = 1000;

/// Allocate a session identifier: time-ordered, with a short random
/// suffix to keep concurrent uploads distinct.
pub fn new_upload_id() -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("UNIFIED_{}_{}", stamp, &suffix[..6])
}

/// Per-run totals, returned for logging and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunTotals {
    pub processed: i64,
    pub errors: i64,
    pub pending: i64,
    pub dropped: i64,
}

pub struct BatchCoordinator {
    pool: SqlitePool,
    decomposer: Decomposer,
}

impl BatchCoordinator {
    pub fn new(pool: SqlitePool, target_state: impl Into<String>) -> Self {
        Self {
            pool,
            decomposer: Decomposer::new(target_state),
        }
    }

    /// Run a full upload session over pre-parsed records.
    ///
    /// Creates the session row, processes every batch, and finalizes.
    /// Always finalizes exactly once, including on fatal errors and
    /// cancellation.
    pub async fn run(
        &self,
        upload_id: &str,
        records: Vec<RawRecord>,
        cancel: CancellationToken,
    ) -> Result<RunTotals> {
        let session = UploadSession::new(upload_id.to_string());
        store::sessions::create_session(&self.pool, &session).await?;
        tracing::info!(upload_id, rows = records.len(), "Upload session started");

        match self.process_stream(upload_id, &records, &cancel).await {
            Ok((totals, errors)) => {
                let status = if cancel.is_cancelled() {
                    SessionStatus::Failed
                } else if totals.errors > 0 {
                    SessionStatus::CompletedWithErrors
                } else {
                    SessionStatus::Completed
                };
                let message = cancel.is_cancelled().then(|| "Upload cancelled".to_string());
                store::sessions::finalize_session(
                    &self.pool,
                    upload_id,
                    status,
                    &errors,
                    message.as_deref(),
                )
                .await?;
                tracing::info!(
                    upload_id,
                    processed = totals.processed,
                    errors = totals.errors,
                    pending = totals.pending,
                    dropped = totals.dropped,
                    status = status.as_str(),
                    "Upload session finished"
                );
                Ok(totals)
            }
            Err(e) => {
                // Fatal: preserve the exception text on the session
                tracing::error!(upload_id, error = %e, "Upload session failed");
                store::sessions::finalize_session(
                    &self.pool,
                    upload_id,
                    SessionStatus::Failed,
                    &[],
                    Some(&e.to_string()),
                )
                .await?;
                Err(e)
            }
        }
    }

    async fn process_stream(
        &self,
        upload_id: &str,
        records: &[RawRecord],
        cancel: &CancellationToken,
    ) -> Result<(RunTotals, Vec<SessionError>)> {
        let mut totals = RunTotals::default();
        let mut captured: Vec<SessionError> = Vec::new();

        for (batch_index, batch) in records.chunks(BATCH_SIZE).enumerate() {
            // Cancellation is checked between batches, never mid-batch
            if cancel.is_cancelled() {
                tracing::warn!(upload_id, batch = batch_index, "Upload cancelled");
                break;
            }

            let mut batch_processed = 0i64;
            let mut batch_errors = 0i64;

            for (offset, record) in batch.iter().enumerate() {
                let row_number = batch_index * BATCH_SIZE + offset + 1;
                match self.decomposer.decompose(record) {
                    RowOutcome::Entities(row) => {
                        match store::apply_decomposed_row(&self.pool, &row).await {
                            Ok(()) => batch_processed += 1,
                            Err(e) => {
                                batch_errors += 1;
                                capture_error(
                                    &mut captured,
                                    row_number,
                                    "persistence_error",
                                    &e.to_string(),
                                    record,
                                );
                            }
                        }
                    }
                    RowOutcome::Pending(reason) => {
                        match store::pending::insert_candidate(&self.pool, record, reason).await {
                            Ok(_) => {
                                totals.pending += 1;
                                batch_processed += 1;
                            }
                            Err(e) => {
                                batch_errors += 1;
                                capture_error(
                                    &mut captured,
                                    row_number,
                                    "persistence_error",
                                    &e.to_string(),
                                    record,
                                );
                            }
                        }
                    }
                    RowOutcome::Dropped => {
                        totals.dropped += 1;
                        batch_processed += 1;
                    }
                    RowOutcome::Failed(message) => {
                        batch_errors += 1;
                        capture_error(
                            &mut captured,
                            row_number,
                            "decomposition_error",
                            &message,
                            record,
                        );
                    }
                }
            }

            store::sessions::increment_counts(&self.pool, upload_id, batch_processed, batch_errors)
                .await?;
            totals.processed += batch_processed;
            totals.errors += batch_errors;
            tracing::debug!(
                upload_id,
                batch = batch_index,
                processed = batch_processed,
                errors = batch_errors,
                "Batch committed"
            );
        }

        Ok((totals, captured))
    }
}

fn capture_error(
    captured: &mut Vec<SessionError>,
    row: usize,
    error_type: &str,
    message: &str,
    record: &RawRecord,
) {
    if captured.len() < MAX_CAPTURED_ERRORS {
        captured.push(SessionError {
            row,
            error_type: error_type.to_string(),
            message: message.to_string(),
            raw_row: record.clone(),
        });
    }
}
