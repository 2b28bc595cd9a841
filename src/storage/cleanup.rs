use super::ObjectStore;
use crate::config::env_parse;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl CleanupPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse::<u32>("CLEANUP_MAX_ATTEMPTS")
                .filter(|v| *v >= 1)
                .unwrap_or(defaults.max_attempts),
            base_delay: env_parse::<u64>("CLEANUP_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
        }
    }

    /// Wait after the given failed attempt (1-based): base, 2x base, 4x base...
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Error)]
#[error("failed to delete `{cid}` after {attempts} attempts: {last_error}")]
pub struct CleanupError {
    pub cid: String,
    pub attempts: u32,
    pub last_error: String,
}

/// Deletes `cid`, retrying with exponential backoff. Returns the number of
/// attempts used.
pub async fn delete_with_retry(
    store: &dyn ObjectStore,
    cid: &str,
    policy: CleanupPolicy,
) -> Result<u32, CleanupError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.delete(cid).await {
            Ok(()) => {
                debug!(target = "photomatch.cleanup", cid = %cid, attempt, "asset_deleted");
                crate::metrics::cleanup_attempts(attempt, true);
                return Ok(attempt);
            }
            Err(err) => {
                if attempt >= max_attempts {
                    crate::metrics::cleanup_attempts(attempt, false);
                    return Err(CleanupError {
                        cid: cid.to_string(),
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }
                let delay = policy.backoff(attempt);
                warn!(
                    target = "photomatch.cleanup",
                    cid = %cid,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "cleanup_retry"
                );
                sleep(delay).await;
            }
        }
    }
}

/// Background worker that deletes staged assets after the response is sent.
#[derive(Clone)]
pub struct CleanupQueue {
    tx: mpsc::Sender<String>,
}

impl CleanupQueue {
    pub fn spawn(store: Arc<dyn ObjectStore>, policy: CleanupPolicy) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<String>(queue_capacity_from_env());
        let handle = tokio::spawn(async move {
            while let Some(cid) = rx.recv().await {
                if let Err(err) = delete_with_retry(store.as_ref(), &cid, policy).await {
                    warn!(target = "photomatch.cleanup", cid = %err.cid, attempts = err.attempts, error = %err.last_error, "cleanup_failed");
                }
            }
        });
        (Self { tx }, handle)
    }

    /// Queues `cid` for deletion; hands it back when the worker is gone or the
    /// queue is full.
    pub fn enqueue(&self, cid: String) -> Result<(), String> {
        self.tx.try_send(cid).map_err(|err| match err {
            mpsc::error::TrySendError::Full(cid) | mpsc::error::TrySendError::Closed(cid) => cid,
        })
    }
}

fn queue_capacity_from_env() -> usize {
    env_parse::<usize>("CLEANUP_QUEUE_CAPACITY")
        .filter(|v| *v > 0)
        .unwrap_or(256)
}
