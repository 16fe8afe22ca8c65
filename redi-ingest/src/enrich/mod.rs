//! Fallback enrichment: APN resolution for pending candidates
//!
//! Three resolvers in strict precedence order: local fuzzy match against
//! already-ingested properties, then the primary external lookup, then
//! the secondary. The cascade stops at the first resolver that returns a
//! confident resolution.

pub mod cascade;
pub mod local_match;
pub mod lookup;
pub mod retry;

use crate::models::{EnrichmentStatus, RawRecord};
use crate::normalize::{map_column, normalize_column_name};
use async_trait::async_trait;
use thiserror::Error;

/// Minimum confidence for a resolution to be accepted, in [0,100].
pub const CONFIDENCE_THRESHOLD: f64 = 80.0;

/// Classification of a resolver failure, drives retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient: retried with backoff
    Timeout,
    /// Provider refused us (captcha, 403/429): no retry, provider
    /// suspended for the rest of the run
    Blocked,
    /// Anything else: retried with backoff
    Other,
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Blocked by provider: {0}")]
    Blocked(String),

    #[error("Lookup failed: {0}")]
    Other(String),
}

impl LookupError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LookupError::Timeout(_) => FailureKind::Timeout,
            LookupError::Blocked(_) => FailureKind::Blocked,
            LookupError::Other(_) => FailureKind::Other,
        }
    }
}

/// A successful APN resolution with its confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub apn: String,
    /// In [0,100]; external lookups report 100 for an exact token match
    pub confidence: f64,
}

/// Standardized address fields extracted from a pending candidate's raw
/// row. Uppercased so comparisons are case-insensitive everywhere.
#[derive(Debug, Clone, Default)]
pub struct CandidateAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub owner_name: String,
}

impl CandidateAddress {
    /// Extract from a raw row using the same header normalization and
    /// alias mapping the decomposer uses.
    pub fn from_record(record: &RawRecord) -> Self {
        let mut address = CandidateAddress::default();
        for (raw_key, value) in record.iter() {
            let Some(canonical) = map_column(&normalize_column_name(raw_key)) else {
                continue;
            };
            let value = value.trim().to_uppercase();
            if value.is_empty() {
                continue;
            }
            match canonical {
                "property address" => address.street = value,
                "property city" => address.city = value,
                "property state" => address.state = value,
                "property zip" => {
                    // keep the 5-digit prefix of zip+4 spellings
                    address.zip = value
                        .split_once('-')
                        .map(|(head, _)| head.to_string())
                        .unwrap_or(value)
                }
                "first name" => {
                    if address.owner_name.is_empty() {
                        address.owner_name = value;
                    } else {
                        address.owner_name = format!("{} {}", value, address.owner_name);
                    }
                }
                "last name" => {
                    if address.owner_name.is_empty() {
                        address.owner_name = value;
                    } else {
                        address.owner_name = format!("{} {}", address.owner_name, value);
                    }
                }
                _ => {}
            }
        }
        address
    }

    /// Full "street, city, state zip" form for external query strings.
    pub fn query_string(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for part in [&self.street, &self.city, &self.state, &self.zip] {
            if !part.is_empty() {
                parts.push(part);
            }
        }
        parts.join(" ")
    }

    pub fn has_street(&self) -> bool {
        !self.street.is_empty()
    }
}

/// One APN resolution strategy.
///
/// Implementations must be cheap to call when suspended; the cascade
/// checks `suspended()` before each attempt.
#[async_trait]
pub trait ApnResolver: Send + Sync {
    /// Human-readable provider name, for logs and attempt records.
    fn name(&self) -> &'static str;

    /// Status recorded on the candidate when this resolver succeeds.
    fn method(&self) -> EnrichmentStatus;

    /// Attempt to resolve an APN. `Ok(None)` means a clean miss; the
    /// cascade falls through to the next resolver.
    async fn resolve(&self, candidate: &CandidateAddress) -> Result<Option<Resolution>, LookupError>;

    /// Take this resolver out of rotation for the rest of the run.
    fn suspend(&self);

    fn suspended(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        RawRecord::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn candidate_extracts_and_uppercases() {
        let row = record(&[
            ("Property Address", "123 main st"),
            ("Property City", "Seattle"),
            ("Property State", "wa"),
            ("Property Zip", "98101-1234"),
            ("First Name", "jane"),
            ("Last Name", "doe"),
        ]);
        let candidate = CandidateAddress::from_record(&row);
        assert_eq!(candidate.street, "123 MAIN ST");
        assert_eq!(candidate.zip, "98101");
        assert_eq!(candidate.owner_name, "JANE DOE");
        assert_eq!(candidate.query_string(), "123 MAIN ST SEATTLE WA 98101");
    }

    #[test]
    fn name_order_holds_regardless_of_column_order() {
        let row = record(&[("Last Name", "doe"), ("First Name", "jane")]);
        let candidate = CandidateAddress::from_record(&row);
        assert_eq!(candidate.owner_name, "JANE DOE");
    }

    #[test]
    fn empty_row_yields_empty_candidate() {
        let candidate = CandidateAddress::from_record(&RawRecord::new());
        assert!(!candidate.has_street());
        assert_eq!(candidate.query_string(), "");
    }
}
