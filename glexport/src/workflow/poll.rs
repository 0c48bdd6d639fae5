//! Bounded fixed-delay polling.

use std::time::Duration;

use tokio::time::sleep;

use crate::error::{Error, Result};

/// Polling bounds for server-side jobs. The delay between polls is
/// constant, not exponential.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Delay between consecutive status polls.
    pub interval: Duration,
    /// Maximum number of status polls per job.
    pub max_attempts: u32,
    /// Immediate retries allowed per streak of transient failures.
    pub transient_retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 12,
            transient_retries: 3,
        }
    }
}

/// Tracks one job's consumption of a [`PollPolicy`].
///
/// Rate-limit waits consume poll attempts like ordinary in-progress polls,
/// so a throttling server cannot extend the loop past the configured
/// budget. Transient retries are a separate, smaller budget that resets
/// whenever a poll gets through.
pub(crate) struct PollBudget {
    policy: PollPolicy,
    attempts: u32,
    transient_left: u32,
}

impl PollBudget {
    pub(crate) fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            transient_left: policy.transient_retries,
        }
    }

    /// The job is still queued or started: wait the fixed interval.
    pub(crate) async fn wait_pending(&mut self) -> Result<()> {
        self.transient_left = self.policy.transient_retries;
        self.consume(self.policy.interval).await
    }

    /// The API throttled us: wait the delay it asked for, or the normal
    /// interval when it did not say.
    pub(crate) async fn wait_rate_limited(&mut self, retry_after: Option<Duration>) -> Result<()> {
        let delay = retry_after.unwrap_or(self.policy.interval);
        tracing::warn!(?delay, "rate limited while polling");
        self.consume(delay).await
    }

    /// Whether a transient failure may still be retried immediately.
    pub(crate) fn absorb_transient(&mut self) -> bool {
        if self.transient_left == 0 {
            return false;
        }
        self.transient_left -= 1;
        true
    }

    async fn consume(&mut self, delay: Duration) -> Result<()> {
        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            return Err(Error::Timeout {
                attempts: self.attempts,
            });
        }
        sleep(delay).await;
        Ok(())
    }
}
