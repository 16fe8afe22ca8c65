//! Retry with linear backoff for external lookups
//!
//! Timeouts and transient errors get up to three attempts with a
//! growing delay; a blocked response is returned immediately so the
//! cascade can suspend the provider.

use super::{FailureKind, LookupError};
use std::future::Future;
use std::time::Duration;

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Run `operation` up to [`MAX_RETRIES`] times, sleeping
/// `RETRY_DELAY * attempt` between attempts.
pub async fn with_retry<T, F, Fut>(label: &str, mut operation: F) -> Result<T, LookupError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LookupError>>,
{
    let mut last_error = None;
    for attempt in 1..=MAX_RETRIES {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if e.kind() == FailureKind::Blocked {
                    // Retrying a block only digs the hole deeper
                    return Err(e);
                }
                tracing::warn!(label, attempt, error = %e, "Lookup attempt failed");
                last_error = Some(e);
                if attempt < MAX_RETRIES {
                    tokio::time::sleep(RETRY_DELAY * attempt).await;
                }
            }
        }
    }
    // last_error is always set when the loop falls through
    Err(last_error
        .unwrap_or_else(|| LookupError::Other(format!("{}: retries exhausted", label))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(LookupError::Timeout("slow".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LookupError::Blocked("captcha".into())) }
        })
        .await;
        assert!(matches!(result, Err(LookupError::Blocked(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error() {
        let result: Result<(), _> = with_retry("test", || async {
            Err(LookupError::Other("boom".into()))
        })
        .await;
        assert!(matches!(result, Err(LookupError::Other(_))));
    }
}
