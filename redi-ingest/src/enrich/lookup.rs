//! External APN lookup clients
//!
//! Two providers behind the same trait: a primary keyless text-search
//! endpoint and a secondary token-authenticated API. Both scan the
//! response text for a parcel-number token rather than trusting any
//! particular response schema.

use super::retry::with_retry;
use super::{ApnResolver, CandidateAddress, LookupError, Resolution};
use crate::models::EnrichmentStatus;
use crate::validators::clean_apn;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RATE_LIMIT_MS: u64 = 1000;
const USER_AGENT: &str = "redi-ingest/0.1.0";

/// Bare 10-digit parcel numbers, or the common 3-3-3 hyphenated form.
static APN_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{10}\b|\b\d{3}-\d{3}-\d{3}\b").unwrap());

/// First parcel-number token in a blob of response text, canonicalized.
pub fn extract_apn_token(text: &str) -> Option<String> {
    let token = APN_TOKEN.find(text)?.as_str().replace('-', "");
    clean_apn(&token)
}

/// Minimum-interval rate limiter shared by each client's requests.
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn classify_send_error(e: reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Timeout(e.to_string())
    } else {
        LookupError::Other(e.to_string())
    }
}

async fn classify_response(response: reqwest::Response) -> Result<String, LookupError> {
    let status = response.status();
    if status.as_u16() == 403 || status.as_u16() == 429 {
        return Err(LookupError::Blocked(format!("HTTP {}", status)));
    }
    let body = response
        .text()
        .await
        .map_err(|e| LookupError::Other(e.to_string()))?;
    if !status.is_success() {
        return Err(LookupError::Other(format!("HTTP {}", status)));
    }
    if body.to_lowercase().contains("captcha") {
        return Err(LookupError::Blocked("Captcha challenge in response".into()));
    }
    Ok(body)
}

fn build_client() -> Result<reqwest::Client, LookupError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| LookupError::Other(e.to_string()))
}

/// Keyless text-search lookup. Listing aggregators are excluded from the
/// query because their pages repeat parcel-like numbers that are not the
/// subject property's.
pub struct PrimaryLookup {
    http_client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
    suspended: AtomicBool,
}

impl PrimaryLookup {
    pub fn new(base_url: String) -> Result<Self, LookupError> {
        Ok(Self {
            http_client: build_client()?,
            base_url,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
            suspended: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl ApnResolver for PrimaryLookup {
    fn name(&self) -> &'static str {
        "primary_external"
    }

    fn method(&self) -> EnrichmentStatus {
        EnrichmentStatus::EnrichedViaPrimary
    }

    async fn resolve(
        &self,
        candidate: &CandidateAddress,
    ) -> Result<Option<Resolution>, LookupError> {
        if !candidate.has_street() {
            return Ok(None);
        }
        let query = format!("{} -site:zillow.com", candidate.query_string());

        let body = with_retry(self.name(), || {
            let query = query.clone();
            async move {
                self.rate_limiter.wait().await;
                tracing::debug!(query = %query, "Querying primary lookup");
                let response = self
                    .http_client
                    .get(&self.base_url)
                    .query(&[("q", query.as_str())])
                    .send()
                    .await
                    .map_err(classify_send_error)?;
                classify_response(response).await
            }
        })
        .await?;

        Ok(extract_apn_token(&body).map(|apn| {
            tracing::info!(apn = %apn, "Primary lookup resolved APN");
            Resolution {
                apn,
                confidence: 100.0,
            }
        }))
    }

    fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    fn suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}

/// Token-authenticated property API.
pub struct SecondaryLookup {
    http_client: reqwest::Client,
    base_url: String,
    token: String,
    rate_limiter: Arc<RateLimiter>,
    suspended: AtomicBool,
}

impl SecondaryLookup {
    pub fn new(base_url: String, token: String) -> Result<Self, LookupError> {
        Ok(Self {
            http_client: build_client()?,
            base_url,
            token,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
            suspended: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl ApnResolver for SecondaryLookup {
    fn name(&self) -> &'static str {
        "secondary_external"
    }

    fn method(&self) -> EnrichmentStatus {
        EnrichmentStatus::EnrichedViaSecondary
    }

    async fn resolve(
        &self,
        candidate: &CandidateAddress,
    ) -> Result<Option<Resolution>, LookupError> {
        if !candidate.has_street() {
            return Ok(None);
        }
        let payload = serde_json::json!({
            "street": candidate.street,
            "city": candidate.city,
            "state": candidate.state,
            "zip": candidate.zip,
        });

        let street = candidate.street.clone();
        let body = with_retry(self.name(), || {
            let payload = payload.clone();
            let street = street.clone();
            async move {
                self.rate_limiter.wait().await;
                tracing::debug!(street = %street, "Querying secondary lookup");
                let response = self
                    .http_client
                    .post(&self.base_url)
                    .bearer_auth(&self.token)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(classify_send_error)?;
                classify_response(response).await
            }
        })
        .await?;

        Ok(extract_apn_token(&body).map(|apn| {
            tracing::info!(apn = %apn, "Secondary lookup resolved APN");
            Resolution {
                apn,
                confidence: 100.0,
            }
        }))
    }

    fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    fn suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_ten_digit_token() {
        let text = "Parcel number 1234567890 per county records";
        assert_eq!(extract_apn_token(text), Some("1234567890".to_string()));
    }

    #[test]
    fn extracts_hyphenated_token() {
        let text = "APN: 123-456-789";
        assert_eq!(extract_apn_token(text), Some("0123456789".to_string()));
    }

    #[test]
    fn ignores_shorter_and_longer_runs() {
        assert_eq!(extract_apn_token("call 12345678901 now"), None);
        assert_eq!(extract_apn_token("zip 98101"), None);
        assert_eq!(extract_apn_token(""), None);
    }

    #[test]
    fn first_token_wins() {
        let text = "1111111111 then 2222222222";
        assert_eq!(extract_apn_token(text), Some("1111111111".to_string()));
    }
}
