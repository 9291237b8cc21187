use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use super::{DocumentStore, StoreError, Transaction};

const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Errors that are worth another attempt (conflicts, transport failures).
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            StoreError::Conflict | StoreError::Unavailable(_) => true,
            StoreError::Database(err) => matches!(err, sqlx::Error::Protocol(_)),
            StoreError::NotFound { .. }
            | StoreError::InvalidDocument(_)
            | StoreError::Malformed(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Exponential backoff before retry number `attempt` (1-based), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// [`RetryPolicy::backoff`] scaled by a random factor in `0.5..=1.0`, so
    /// callers that collided once don't collide again on the same schedule.
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        self.backoff(attempt).mul_f64(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(25))
    }
}

/// Runs `body` inside a fresh transaction and commits it, retrying the whole
/// unit on retryable failures.
///
/// `body` hands the transaction back alongside its result so the commit
/// happens here. Non-retryable errors (validation, not-found) return at once.
pub async fn run_transaction<S, T, E, F, Fut>(
    store: &S,
    policy: &RetryPolicy,
    mut body: F,
) -> Result<T, E>
where
    S: DocumentStore + ?Sized,
    E: From<StoreError> + Retryable + Display,
    F: FnMut(Box<dyn Transaction>) -> Fut,
    Fut: Future<Output = Result<(Box<dyn Transaction>, T), E>>,
{
    let mut attempt = 1;
    loop {
        let outcome = async {
            let tx = store.begin().await?;
            let (tx, value) = body(tx).await?;
            tx.commit().await?;
            Ok::<T, E>(value)
        }
        .await;

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.jittered_backoff(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transaction failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
