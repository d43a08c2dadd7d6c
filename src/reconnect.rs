//! Reconnect policy for the stream worker.
//!
//! The client never gives up on the agent server: every close schedules
//! another attempt after the same fixed delay, with no attempt ceiling and no
//! backoff growth.

use std::time::Duration;

use tracing::debug;

/// Delay applied between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5_000);

/// Shortest delay the worker will wait between attempts.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(1);

/// Policy controlling when the worker opens a replacement connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay between a close and the next attempt.
    pub delay: Duration,
}

impl ReconnectPolicy {
    /// Retries forever, waiting `delay` after every close.
    ///
    /// A zero delay is raised to [`MIN_RECONNECT_DELAY`] so a server that
    /// keeps refusing cannot spin the worker.
    pub fn forever(delay: Duration) -> Self {
        Self {
            delay: delay.max(MIN_RECONNECT_DELAY),
        }
    }

    /// Computes the delay to apply before the given reconnect attempt.
    ///
    /// `attempt` is 1-based. The delay does not depend on it, and is never
    /// below [`MIN_RECONNECT_DELAY`] even if `delay` was set directly.
    pub fn delay_for_attempt(&self, _attempt: u64) -> Duration {
        self.delay.max(MIN_RECONNECT_DELAY)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::forever(DEFAULT_RECONNECT_DELAY)
    }
}

/// Waits out the reconnect delay for `attempt`.
pub async fn wait_before_attempt(policy: &ReconnectPolicy, attempt: u64) {
    let delay = policy.delay_for_attempt(attempt);
    debug!(
        event = "reconnect_scheduled",
        attempt,
        delay_ms = delay.as_millis() as u64
    );
    tokio::time::sleep(delay).await;
}
