//! Pending-repair queue entries
//!
//! Rows that cannot produce a usable identifier or zip are routed here
//! instead of failing the upload. The fallback cascade reads this queue
//! and deletes an entry only after a successful re-ingest.

use super::record::RawRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why decomposition routed a row to the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingReason {
    MissingApn,
    ApnNotNumericOrTooShort,
    InvalidPropertyZip,
    InvalidMailingZip,
}

impl PendingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingReason::MissingApn => "missing_apn",
            PendingReason::ApnNotNumericOrTooShort => "apn_not_numeric_or_too_short",
            PendingReason::InvalidPropertyZip => "invalid_property_zip",
            PendingReason::InvalidMailingZip => "invalid_mailing_zip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "missing_apn" => Some(PendingReason::MissingApn),
            "apn_not_numeric_or_too_short" => Some(PendingReason::ApnNotNumericOrTooShort),
            "invalid_property_zip" => Some(PendingReason::InvalidPropertyZip),
            "invalid_mailing_zip" => Some(PendingReason::InvalidMailingZip),
            _ => None,
        }
    }
}

/// Enrichment lifecycle of a pending candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Pending,
    EnrichedViaLocalDb,
    EnrichedViaPrimary,
    EnrichedViaSecondary,
    Failed,
    Error,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::EnrichedViaLocalDb => "enriched_via_local_db",
            EnrichmentStatus::EnrichedViaPrimary => "enriched_via_primary",
            EnrichmentStatus::EnrichedViaSecondary => "enriched_via_secondary",
            EnrichmentStatus::Failed => "failed",
            EnrichmentStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EnrichmentStatus::Pending),
            "enriched_via_local_db" => Some(EnrichmentStatus::EnrichedViaLocalDb),
            "enriched_via_primary" => Some(EnrichmentStatus::EnrichedViaPrimary),
            "enriched_via_secondary" => Some(EnrichmentStatus::EnrichedViaSecondary),
            "failed" => Some(EnrichmentStatus::Failed),
            "error" => Some(EnrichmentStatus::Error),
            _ => None,
        }
    }
}

/// One entry in the pending-repair queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCandidate {
    pub id: Uuid,
    /// The original raw row, preserved verbatim for re-ingestion
    pub raw_row: RawRecord,
    pub reason: PendingReason,
    pub status: EnrichmentStatus,
    pub created_at: DateTime<Utc>,
    /// Method that resolved the candidate, if any
    pub enrichment_method: Option<String>,
    /// Local-match confidence in [0,100], if applicable
    pub enrichment_confidence: Option<f64>,
    /// The resolved APN, if any
    pub enrichment_apn: Option<String>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<i64>,
    /// Preserved exception text for status = error
    pub error: Option<String>,
}
