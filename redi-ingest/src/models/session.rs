//! Upload session state
//!
//! One session per ingestion run: created at stream start, counters
//! updated incrementally per batch, finalized exactly once at stream end
//! or on a fatal error.

use super::record::RawRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error samples captured on a session are capped at this size.
pub const MAX_CAPTURED_ERRORS: usize = 1000;

/// Upload session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::CompletedWithErrors => "completed_with_errors",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(SessionStatus::Processing),
            "completed" => Some(SessionStatus::Completed),
            "completed_with_errors" => Some(SessionStatus::CompletedWithErrors),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Processing)
    }
}

/// One captured per-row error (sampled, capped at [`MAX_CAPTURED_ERRORS`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionError {
    pub row: usize,
    /// Error taxonomy bucket, e.g. "decomposition_error",
    /// "persistence_error"
    pub error_type: String,
    pub message: String,
    /// The raw row, preserved for the error-rows re-export
    pub raw_row: RawRecord,
}

/// One ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub upload_id: String,
    pub status: SessionStatus,
    pub processed_count: i64,
    pub error_count: i64,
    pub errors: Vec<SessionError>,
    /// Fatal-exception text when status = failed
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    pub fn new(upload_id: String) -> Self {
        Self {
            upload_id,
            status: SessionStatus::Processing,
            processed_count: 0,
            error_count: 0,
            errors: Vec::new(),
            error_message: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Histogram of captured errors by error_type, for the report
    /// endpoint.
    pub fn error_histogram(&self) -> std::collections::BTreeMap<String, usize> {
        let mut histogram = std::collections::BTreeMap::new();
        for err in &self.errors {
            *histogram.entry(err.error_type.clone()).or_insert(0) += 1;
        }
        histogram
    }
}
