//! Bounded-backoff retry wrapper for remote calls.
//!
//! Transient failures ([`ProviderError::is_transient`]) are retried with
//! exponentially growing delay, capped at [`Backoff::max`], until the call
//! succeeds or fails fatally. Fatal failures propagate untouched.
use crate::provider::ProviderResult;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Initial delay of [`Backoff::default`].
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
/// Delay ceiling of [`Backoff::default`].
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential backoff policy: delay doubles per attempt up to `max`.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound on the delay between retries.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_BACKOFF,
            max: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Run `call` until it succeeds or fails with a non-transient error.
///
/// `op` names the remote operation for log lines only.
pub async fn with_backoff<T, F, Fut>(policy: &Backoff, op: &str, mut call: F) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut delay = policy.initial;
    let mut attempt: u32 = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                warn!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient provider error, backing off"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.max);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
