//! Local fuzzy matcher
//!
//! First rung of the cascade: compares a candidate's street and owner
//! name against every already-ingested property using normalized
//! Levenshtein similarity. Free and instant, so it always runs before
//! any external lookup.

use super::{ApnResolver, CandidateAddress, LookupError, Resolution, CONFIDENCE_THRESHOLD};
use crate::models::EnrichmentStatus;
use crate::store::properties::MatchTarget;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use strsim::normalized_levenshtein;

const STREET_WEIGHT: f64 = 0.8;
const NAME_WEIGHT: f64 = 0.2;

pub struct LocalMatcher {
    targets: Vec<MatchTarget>,
    suspended: AtomicBool,
}

impl LocalMatcher {
    pub fn new(targets: Vec<MatchTarget>) -> Self {
        Self {
            targets,
            suspended: AtomicBool::new(false),
        }
    }

    /// Weighted similarity score in [0,100].
    fn score(candidate: &CandidateAddress, target: &MatchTarget) -> f64 {
        let street_sim =
            normalized_levenshtein(&candidate.street, &target.street.to_uppercase());
        let name_sim = if candidate.owner_name.is_empty() {
            0.0
        } else {
            normalized_levenshtein(&candidate.owner_name, &target.owner_name.to_uppercase())
        };
        (street_sim * STREET_WEIGHT + name_sim * NAME_WEIGHT) * 100.0
    }
}

#[async_trait]
impl ApnResolver for LocalMatcher {
    fn name(&self) -> &'static str {
        "local_db"
    }

    fn method(&self) -> EnrichmentStatus {
        EnrichmentStatus::EnrichedViaLocalDb
    }

    async fn resolve(
        &self,
        candidate: &CandidateAddress,
    ) -> Result<Option<Resolution>, LookupError> {
        if !candidate.has_street() {
            return Ok(None);
        }

        let mut best: Option<(f64, &MatchTarget)> = None;
        for target in &self.targets {
            // A known zip narrows the comparison set
            if !candidate.zip.is_empty() && target.zip != candidate.zip {
                continue;
            }
            let score = Self::score(candidate, target);
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, target));
            }
        }

        match best {
            Some((confidence, target)) if confidence >= CONFIDENCE_THRESHOLD => {
                tracing::info!(
                    apn = %target.apn,
                    confidence = format!("{:.1}", confidence).as_str(),
                    "Local match accepted"
                );
                Ok(Some(Resolution {
                    apn: target.apn.clone(),
                    confidence,
                }))
            }
            Some((confidence, _)) => {
                tracing::debug!(
                    confidence = format!("{:.1}", confidence).as_str(),
                    "Best local match below threshold"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    fn suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}
