//! Retry with bounded exponential backoff.
//!
//! Only failures classified as [`ErrorKind::Retryable`] are repeated. Waiting between
//! attempts stops as soon as the run is cancelled.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{ErrorKind, ExecutionError, ProviderError};

/// Retry policy for provider calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

/// Result of a retried call plus the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    /// Final result.
    pub result: Result<T, ExecutionError>,
    /// Attempts made.
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Runs `operation` until it succeeds, fails terminally, exhausts the
    /// attempt limit, or `cancel` fires during a backoff.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut operation: F) -> Attempted<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = operation(attempt).await;
            let error = match (ErrorKind::of(&result), result) {
                (_, Ok(value)) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                (ErrorKind::Retryable, Err(error)) => error,
                (_, Err(error)) => {
                    return Attempted {
                        result: Err(error.into()),
                        attempts: attempt,
                    };
                }
            };

            if attempt >= self.max_attempts {
                return Attempted {
                    result: Err(ExecutionError::RetriesExhausted {
                        attempts: attempt,
                        source: error,
                    }),
                    attempts: attempt,
                };
            }

            let delay = self.delay_for_attempt(attempt);
            warn!(
                "Attempt {attempt}/{} failed: {error}. Retrying in {}ms",
                self.max_attempts,
                delay.as_millis()
            );

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Retry abandoned after cancellation");
                    return Attempted {
                        result: Err(ExecutionError::Cancelled {
                            attempts: attempt,
                            source: error,
                        }),
                        attempts: attempt,
                    };
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(5_000));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn test_eventual_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let outcome = fast_policy(3)
            .run(&CancellationToken::new(), |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(ProviderError::retryable("throttled"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.expect("succeeds"), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let outcome = fast_policy(5)
            .run(&CancellationToken::new(), |_| async {
                Err::<(), _>(ProviderError::terminal("access denied"))
            })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert!(matches!(
            outcome.result,
            Err(ExecutionError::Provider(ProviderError::Terminal { .. }))
        ));
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let outcome = fast_policy(3)
            .run(&CancellationToken::new(), |_| async {
                Err::<(), _>(ProviderError::retryable("throttled"))
            })
            .await;

        assert_eq!(outcome.attempts, 3);
        assert!(matches!(
            outcome.result,
            Err(ExecutionError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_retries_provider_calls() {
        use crate::provider::{MockProvider, Operation, Provider, ProviderRequest};
        use crate::resource::Outputs;
        use mockall::Sequence;

        let mut provider = MockProvider::new();
        let mut seq = Sequence::new();
        provider
            .expect_apply()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ProviderError::retryable("rate limited")));
        provider
            .expect_apply()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Outputs::new()));

        let request = ProviderRequest {
            operation: Operation::Create,
            deployment: crate::state::DeploymentId::new("demo", "dev"),
            resource_type: String::from("storage:bucket"),
            name: String::from("bucket1"),
            properties: std::collections::BTreeMap::new(),
            prior_outputs: None,
            changed_fields: vec![],
        };

        let outcome = fast_policy(3)
            .run(&CancellationToken::new(), |_| provider.apply(&request))
            .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_cancellation_stops_backoff() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(60),
            multiplier: 1.0,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = policy
            .run(&cancel, |_| async {
                Err::<(), _>(ProviderError::retryable("throttled"))
            })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert!(matches!(outcome.result, Err(ExecutionError::Cancelled { .. })));
    }
}
