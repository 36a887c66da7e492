//! Retry loop with jittered backoff and gas-limit adaptation.
//!
//! The loop is iterative and owns the whole attempt history: each failure
//! is classified once, logged, and folded into the next `GasLimitState`.
//! By default it retries forever; liveness against a permanently failing
//! call comes from the cancellation token, not an attempt cap.

use std::time::Duration;

use attmig_client::ClientError;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::MigrationError;
use crate::gas::GasLimitState;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Fixed part of the inter-attempt delay.
    pub base_delay: Duration,
    /// Upper bound of the uniform random jitter added to `base_delay`.
    pub jitter_max: Duration,
    /// `None` retries indefinitely.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(4000),
            jitter_max: Duration::from_millis(2000),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> Duration {
        if self.jitter_max.is_zero() {
            return self.base_delay;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter_max.as_millis() as u64);
        self.base_delay + Duration::from_millis(jitter_ms)
    }
}

pub struct RetryExecutor {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    /// Run `op` until it succeeds, the attempt cap is hit, or the token is
    /// cancelled. Every attempt receives the gas-limit state derived from
    /// the previous failure; the first attempt runs with no override.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        label: &str,
        mut op: F,
    ) -> Result<T, MigrationError>
    where
        F: FnMut(GasLimitState) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut state = GasLimitState::unset();
        let mut attempts: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(MigrationError::Cancelled);
            }

            attempts = attempts.saturating_add(1);
            let err = match op(state).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let kind = err.failure_kind();
            warn!(%label, attempt = attempts, ?kind, error = %err, "attempt failed");

            if let Some(max) = self.policy.max_attempts
                && attempts >= max
            {
                return Err(MigrationError::AttemptsExhausted {
                    label: label.to_string(),
                    attempts,
                    last_error: err.to_string(),
                });
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(MigrationError::Cancelled),
                _ = tokio::time::sleep(self.policy.backoff()) => {}
            }

            state = state.next_for_failure(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use attmig_client::RpcError;

    use super::*;

    fn instant_policy(max_attempts: Option<u32>) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::ZERO,
            jitter_max: Duration::ZERO,
            max_attempts,
        }
    }

    fn transient_error() -> ClientError {
        ClientError::Rpc(RpcError::ConnectionFailed {
            url: "http://localhost:8545".into(),
            cause: "refused".into(),
        })
    }

    fn estimation_error() -> ClientError {
        ClientError::Rpc(RpcError::JsonRpcError {
            method: "eth_sendTransaction".into(),
            code: -32000,
            message: "cannot estimate gas".into(),
            data: None,
        })
    }

    fn ceiling_error() -> ClientError {
        ClientError::Rpc(RpcError::JsonRpcError {
            method: "eth_sendTransaction".into(),
            code: -32000,
            message: "tx gas limit 45000000 exceeds block gas limit 30000000".into(),
            data: None,
        })
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_override() {
        let executor = RetryExecutor::new(instant_policy(None), CancellationToken::new());
        let result = executor
            .execute_with_retry("read", |state| async move {
                assert_eq!(state.limit(), None);
                Ok::<_, ClientError>(7u64)
            })
            .await;
        assert_eq!(result.ok(), Some(7));
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let executor = RetryExecutor::new(instant_policy(None), CancellationToken::new());
        let calls = AtomicU32::new(0);
        let result = executor
            .execute_with_retry("read", |state| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    // Transient failures never install an override.
                    assert_eq!(state.limit(), None);
                    if n < 3 {
                        Err(transient_error())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.ok(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn escalates_gas_after_estimation_failures() {
        let executor = RetryExecutor::new(instant_policy(None), CancellationToken::new());
        let calls = AtomicU32::new(0);
        let result = executor
            .execute_with_retry("settle", |state| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 => {
                            assert_eq!(state.limit(), None);
                            Err(estimation_error())
                        }
                        1 => {
                            assert_eq!(state.limit(), Some(150_000));
                            Err(estimation_error())
                        }
                        2 => {
                            assert_eq!(state.limit(), Some(225_000));
                            Ok(())
                        }
                        _ => unreachable!(),
                    }
                }
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn bounds_gas_to_the_reported_ceiling() {
        let executor = RetryExecutor::new(instant_policy(None), CancellationToken::new());
        let calls = AtomicU32::new(0);
        let result = executor
            .execute_with_retry("settle", |state| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ceiling_error())
                    } else {
                        assert_eq!(state.limit(), Some(28_500_000));
                        Ok(())
                    }
                }
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn attempt_cap_surfaces_the_last_error() {
        let executor = RetryExecutor::new(instant_policy(Some(3)), CancellationToken::new());
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = executor
            .execute_with_retry("settle", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient_error()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(MigrationError::AttemptsExhausted {
                label, attempts, ..
            }) => {
                assert_eq!(label, "settle");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_during_backoff() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(3600),
            jitter_max: Duration::ZERO,
            max_attempts: None,
        };
        let cancel = CancellationToken::new();
        let executor = RetryExecutor::new(policy, cancel.clone());

        let handle = tokio::spawn(async move {
            executor
                .execute_with_retry("settle", |_| async { Err::<(), _>(transient_error()) })
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = handle.await.unwrap_or(Err(MigrationError::Cancelled));
        assert!(matches!(result, Err(MigrationError::Cancelled)));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let executor = RetryExecutor::new(instant_policy(None), cancel);
        let result: Result<(), _> = executor
            .execute_with_retry("read", |_| async { Ok(()) })
            .await;
        assert!(matches!(result, Err(MigrationError::Cancelled)));
    }
}
