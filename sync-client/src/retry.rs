//! Deadline and bounded retry around one remote call.

use std::future::Future;
use std::time::Duration;

use sync_core::backoff_delay;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Deadline and retry budget for one class of call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Retries after the first attempt; `0` means a single guarded attempt.
    pub retries: u32,
    /// Backoff base; retry `n` (zero-based) waits `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    pub const fn new(timeout: Duration, retries: u32, base_delay: Duration) -> Self {
        Self {
            timeout,
            retries,
            base_delay,
        }
    }

    /// Maximum number of invocations of the task.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Run `task` under `policy`.
///
/// Each attempt races the task against the deadline. A timeout or error is
/// retried after an exponential backoff until the budget is spent; the most
/// recent error is then returned. The task is re-created for every attempt.
pub async fn run_with_retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    mut task: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, task()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation: label.to_string(),
                after: policy.timeout,
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.retries => {
                let delay = backoff_delay(policy.base_delay, attempt);
                debug!(
                    call = label,
                    attempt = attempt + 1,
                    ?delay,
                    error = %err,
                    "Call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(
                    call = label,
                    attempts = attempt + 1,
                    error = %err,
                    "Call failed, retries exhausted"
                );
                return Err(err);
            }
        }
    }
}
