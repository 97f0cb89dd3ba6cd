// src/exec/retry.rs

//! Retry and timeout policy for worker start / stop requests.

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use tracing::warn;

use crate::errors::Result;

/// Exponential backoff between attempts, capped at `max_backoff_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRetryPolicy {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for WorkerRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 3200,
        }
    }
}

impl WorkerRetryPolicy {
    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// retries are used up.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            None
        } else {
            Some(calculate_backoff(
                attempt - 1,
                self.base_backoff_ms,
                self.max_backoff_ms,
            ))
        }
    }
}

pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let backoff = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(backoff.min(max_ms))
}

/// Run `op` until it succeeds, each try bounded by `timeout`.
///
/// `op` is called once per attempt; the last error is returned when the
/// policy gives up.
pub async fn retry_with_timeout<F, Fut>(
    what: &str,
    policy: WorkerRetryPolicy,
    timeout: Duration,
    mut op: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => err,
            Err(_) => anyhow!("{what} timed out after {}ms", timeout.as_millis()).into(),
        };
        attempt += 1;
        match policy.next_delay(attempt) {
            Some(delay) => {
                warn!(what, attempt, error = %err, ?delay, "retrying");
                tokio::time::sleep(delay).await;
            }
            None => return Err(err),
        }
    }
}
