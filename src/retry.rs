//! Bounded retry for rate-limited notification paths
//!
//! Interactive uploads are never retried automatically - a transient platform
//! fault is surfaced to the user with a retry suggestion. Broadcast-style
//! bulk notification paths are the exception: they perform one bounded
//! sleep-and-retry when the platform signals rate limiting, with jitter so a
//! batch of notifications does not retry in lockstep.

use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Configuration for the bounded rate-limit retry
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first (default: 2, i.e. one retry)
    pub max_attempts: u32,
    /// Base delay before the retry
    pub base_delay: Duration,
    /// Random jitter added on top of the base delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

/// Whether a fault is worth a single bounded retry
///
/// The publish collaborator's transient signal and the transport's
/// rate-limit signal qualify; everything else is permanent from the retry
/// loop's point of view.
fn is_rate_limited(error: &Error) -> bool {
    match error {
        Error::Publish(e) => e.is_retryable(),
        Error::Transport(e) => e.is_retryable(),
        _ => false,
    }
}

/// Execute an operation, retrying once (bounded by the policy) when the
/// platform signals rate limiting
///
/// Returns the successful result, or the last error once attempts are
/// exhausted or a non-transient fault occurs.
pub async fn with_rate_limit_retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if is_rate_limited(&e) && attempt < policy.max_attempts => {
                let delay = if policy.jitter {
                    add_jitter(policy.base_delay)
                } else {
                    policy.base_delay
                };
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Rate limited, sleeping before retry"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Add up to 100% random jitter to a delay to prevent thundering herd
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
