//! Fallback cascade
//!
//! Works the pending-repair queue: for each candidate, tries every
//! resolver in precedence order, writes the resolved APN back into the
//! preserved raw row, and re-runs the normal decompose-and-merge path.
//! A candidate leaves the queue only after a successful re-ingest; every
//! attempt is recorded either way.

use super::{ApnResolver, CandidateAddress, CONFIDENCE_THRESHOLD};
use crate::decompose::{Decomposer, RowOutcome};
use crate::enrich::local_match::LocalMatcher;
use crate::enrich::lookup::{PrimaryLookup, SecondaryLookup};
use crate::models::{EnrichmentStatus, PendingCandidate};
use crate::store;
use rand::Rng;
use redi_common::config::ServiceConfig;
use redi_common::Result;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Candidates processed concurrently.
const MAX_IN_FLIGHT: usize = 4;

/// Jittered pause after each candidate, so external providers see an
/// irregular request pattern.
const DELAY_RANGE_MS: std::ops::Range<u64> = 1000..3000;

/// Per-run outcome summary.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct RunReport {
    pub attempted: usize,
    pub enriched: usize,
    pub failed: usize,
    pub errors: usize,
    pub by_method: BTreeMap<String, usize>,
    pub total_ms: i64,
}

impl RunReport {
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.enriched as f64 / self.attempted as f64 * 100.0
        }
    }

    pub fn avg_processing_ms(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.attempted as f64
        }
    }
}

enum CandidateOutcome {
    Enriched(&'static str),
    Failed,
    Error,
}

pub struct FallbackCascade {
    pool: SqlitePool,
    decomposer: Decomposer,
    resolvers: Vec<Arc<dyn ApnResolver>>,
    /// Disabled in tests; pauses between candidates otherwise
    jitter: bool,
    max_in_flight: usize,
}

impl FallbackCascade {
    /// Assemble the standard three-rung cascade from configuration. The
    /// local matcher snapshots the current property set; external rungs
    /// are included only when their endpoints are configured.
    pub async fn from_config(pool: SqlitePool, config: &ServiceConfig) -> Result<Self> {
        let targets = store::properties::list_match_targets(&pool).await?;
        tracing::info!(targets = targets.len(), "Loaded local match targets");

        let mut resolvers: Vec<Arc<dyn ApnResolver>> = vec![Arc::new(LocalMatcher::new(targets))];
        if let Some(url) = &config.primary_lookup_url {
            let primary = PrimaryLookup::new(url.clone())
                .map_err(|e| redi_common::Error::Internal(e.to_string()))?;
            resolvers.push(Arc::new(primary));
        }
        if let Some(url) = &config.secondary_lookup_url {
            let token = config.secondary_lookup_token.clone().unwrap_or_default();
            let secondary = SecondaryLookup::new(url.clone(), token)
                .map_err(|e| redi_common::Error::Internal(e.to_string()))?;
            resolvers.push(Arc::new(secondary));
        }

        Ok(Self::new(pool, config.target_state.clone(), resolvers))
    }

    pub fn new(
        pool: SqlitePool,
        target_state: impl Into<String>,
        resolvers: Vec<Arc<dyn ApnResolver>>,
    ) -> Self {
        Self {
            pool,
            decomposer: Decomposer::new(target_state),
            resolvers,
            jitter: true,
            max_in_flight: MAX_IN_FLIGHT,
        }
    }

    /// Disable the inter-candidate pause (used by tests and local runs).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Override the concurrency bound (tests use 1 for determinism).
    pub fn with_concurrency(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Process up to `limit` enrichable candidates.
    pub async fn run(&self, limit: i64, skip_already_enriched: bool) -> Result<RunReport> {
        let candidates =
            store::pending::list_enrichable(&self.pool, limit, skip_already_enriched).await?;
        tracing::info!(candidates = candidates.len(), "Fallback cascade starting");

        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks: JoinSet<(CandidateOutcome, i64)> = JoinSet::new();
        let mut report = RunReport {
            attempted: candidates.len(),
            ..RunReport::default()
        };

        for candidate in candidates {
            let semaphore = Arc::clone(&semaphore);
            let pool = self.pool.clone();
            let decomposer = self.decomposer.clone();
            let resolvers = self.resolvers.clone();
            let jitter = self.jitter;
            tasks.spawn(async move {
                // Closing the semaphore is not part of this design, so
                // acquire cannot fail
                let _permit = semaphore.acquire().await;
                let started = Instant::now();
                let outcome =
                    process_candidate(&pool, &decomposer, &resolvers, candidate).await;
                if jitter {
                    let pause = rand::thread_rng().gen_range(DELAY_RANGE_MS);
                    tokio::time::sleep(Duration::from_millis(pause)).await;
                }
                (outcome, started.elapsed().as_millis() as i64)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (outcome, elapsed_ms) = joined
                .map_err(|e| redi_common::Error::Internal(format!("Cascade task panicked: {}", e)))?;
            report.total_ms += elapsed_ms;
            match outcome {
                CandidateOutcome::Enriched(method) => {
                    report.enriched += 1;
                    *report.by_method.entry(method.to_string()).or_insert(0) += 1;
                }
                CandidateOutcome::Failed => report.failed += 1,
                CandidateOutcome::Error => report.errors += 1,
            }
        }

        tracing::info!(
            attempted = report.attempted,
            enriched = report.enriched,
            failed = report.failed,
            errors = report.errors,
            success_rate = format!("{:.1}%", report.success_rate()).as_str(),
            "Fallback cascade finished"
        );
        Ok(report)
    }
}

async fn process_candidate(
    pool: &SqlitePool,
    decomposer: &Decomposer,
    resolvers: &[Arc<dyn ApnResolver>],
    candidate: PendingCandidate,
) -> CandidateOutcome {
    let started = Instant::now();
    let address = CandidateAddress::from_record(&candidate.raw_row);
    let mut last_error: Option<String> = None;

    for resolver in resolvers {
        if resolver.suspended() {
            tracing::debug!(resolver = resolver.name(), "Resolver suspended, skipping");
            continue;
        }
        match resolver.resolve(&address).await {
            Ok(Some(resolution)) if resolution.confidence >= CONFIDENCE_THRESHOLD => {
                return finish_enrichment(
                    pool,
                    decomposer,
                    resolver.as_ref(),
                    &candidate,
                    resolution,
                    started,
                )
                .await;
            }
            Ok(Some(resolution)) => {
                tracing::debug!(
                    resolver = resolver.name(),
                    confidence = format!("{:.1}", resolution.confidence).as_str(),
                    "Resolution below confidence threshold"
                );
            }
            Ok(None) => {}
            Err(e) => {
                if e.kind() == super::FailureKind::Blocked {
                    tracing::warn!(resolver = resolver.name(), error = %e,
                        "Resolver blocked, suspending for this run");
                    resolver.suspend();
                }
                last_error = Some(format!("{}: {}", resolver.name(), e));
            }
        }
    }

    // No rung produced a confident resolution
    let elapsed_ms = started.elapsed().as_millis() as i64;
    let (status, outcome, detail) = match last_error {
        Some(message) => (EnrichmentStatus::Error, CandidateOutcome::Error, message),
        None => (
            EnrichmentStatus::Failed,
            CandidateOutcome::Failed,
            "no_identifier_found".to_string(),
        ),
    };
    if let Err(e) = store::pending::record_attempt(
        pool,
        candidate.id,
        status,
        None,
        None,
        None,
        elapsed_ms,
        Some(&detail),
    )
    .await
    {
        tracing::error!(candidate = %candidate.id, error = %e, "Failed to record attempt");
    }
    outcome
}

async fn finish_enrichment(
    pool: &SqlitePool,
    decomposer: &Decomposer,
    resolver: &dyn ApnResolver,
    candidate: &PendingCandidate,
    resolution: super::Resolution,
    started: Instant,
) -> CandidateOutcome {
    // Write the resolved APN back into the preserved row and push it
    // through the normal ingest path
    let mut repaired = candidate.raw_row.clone();
    repaired.set("apn", resolution.apn.clone());

    let reingest_error = match decomposer.decompose(&repaired) {
        RowOutcome::Entities(row) => store::apply_decomposed_row(pool, &row)
            .await
            .err()
            .map(|e| e.to_string()),
        RowOutcome::Pending(reason) => Some(format!(
            "Repaired row still routed to pending: {}",
            reason.as_str()
        )),
        RowOutcome::Dropped => Some("Repaired row is out of jurisdiction".to_string()),
        RowOutcome::Failed(message) => Some(message),
    };
    let elapsed_ms = started.elapsed().as_millis() as i64;

    match reingest_error {
        None => {
            let record = store::pending::record_attempt(
                pool,
                candidate.id,
                resolver.method(),
                Some(resolver.name()),
                Some(resolution.confidence),
                Some(&resolution.apn),
                elapsed_ms,
                None,
            )
            .await;
            if let Err(e) = record {
                tracing::error!(candidate = %candidate.id, error = %e, "Failed to record attempt");
            }
            if let Err(e) = store::pending::delete_candidate(pool, candidate.id).await {
                tracing::error!(candidate = %candidate.id, error = %e,
                    "Failed to remove enriched candidate");
                return CandidateOutcome::Error;
            }
            tracing::info!(
                candidate = %candidate.id,
                apn = %resolution.apn,
                method = resolver.name(),
                "Candidate enriched and re-ingested"
            );
            CandidateOutcome::Enriched(resolver.name())
        }
        Some(message) => {
            tracing::warn!(candidate = %candidate.id, error = %message, "Re-ingest failed");
            if let Err(e) = store::pending::record_attempt(
                pool,
                candidate.id,
                EnrichmentStatus::Error,
                Some(resolver.name()),
                Some(resolution.confidence),
                Some(&resolution.apn),
                elapsed_ms,
                Some(&message),
            )
            .await
            {
                tracing::error!(candidate = %candidate.id, error = %e, "Failed to record attempt");
            }
            CandidateOutcome::Error
        }
    }
}
