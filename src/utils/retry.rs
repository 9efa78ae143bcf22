use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::Result;

/// Bounded retry with exponential backoff, used for rate-limit responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry, doubled for every further one
    pub base_delay_ms: u64,

    /// Upper bound for a single delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2000,
            max_delay_ms: 20000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.min(31)).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Outcome of a single failed attempt
#[derive(Debug)]
pub enum AttemptError {
    /// The remote asked us to slow down; worth retrying
    RateLimited(anyhow::Error),
    /// Retrying would not help
    Permanent(anyhow::Error),
}

impl From<anyhow::Error> for AttemptError {
    fn from(e: anyhow::Error) -> Self {
        AttemptError::Permanent(e)
    }
}

/// Run `op` until it succeeds, fails permanently, or the retry budget is spent
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let mut retry = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Permanent(e)) => return Err(e),
            Err(AttemptError::RateLimited(e)) => {
                if retry >= policy.max_retries {
                    return Err(e.context(format!(
                        "{}: still rate limited after {} retries",
                        label, policy.max_retries
                    )));
                }
                let delay = policy.delay_for(retry);
                tracing::warn!(
                    "{} rate limited, retrying in {:?} ({}/{})",
                    label,
                    delay,
                    retry + 1,
                    policy.max_retries
                );
                sleep(delay).await;
                retry += 1;
            }
        }
    }
}
