//! Exponential-backoff retry for inference server calls.
//!
//! A request that fails transiently (see
//! [`MusicGenApiError::is_transient`]) is retried with increasing delays
//! until it succeeds or [`RetryConfig::max_attempts`] is reached. Permanent
//! failures are returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::api::MusicGenApiError;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Total attempts including the first one.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`RetryConfig::max_delay`].
pub fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut op: F,
) -> Result<T, MusicGenApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MusicGenApiError>>,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < config.max_attempts.max(1) => {
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient MusicGen failure, retrying",
                );
                tokio::time::sleep(delay).await;
                delay = next_delay(delay, config);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    fn fast() -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            ..Default::default()
        }
    }

    fn unavailable() -> MusicGenApiError {
        MusicGenApiError::ApiError {
            status: 503,
            body: "model loading".into(),
        }
    }

    #[test]
    fn next_delay_doubles() {
        let config = RetryConfig::default();
        assert_eq!(
            next_delay(Duration::from_secs(1), &config),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(
            next_delay(Duration::from_secs(8), &config),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(&fast(), "generate", || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok("audio")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "audio");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(), "generate", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(unavailable())
        })
        .await;

        assert_matches!(result, Err(MusicGenApiError::ApiError { status: 503, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(), "generate", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(MusicGenApiError::ApiError {
                status: 422,
                body: "prompt too long".into(),
            })
        })
        .await;

        assert_matches!(result, Err(MusicGenApiError::ApiError { status: 422, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
