//! Exponential-backoff reconnection with a bounded attempt count.
//!
//! When a job's streaming connection drops, the channel calls
//! [`reconnect_loop`] to retry with increasing delays. Unlike an
//! unbounded retry loop, the attempt count is capped: exhausting it is
//! reported to the caller so a terminal error can be surfaced to
//! subscribers instead of retrying forever.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Maximum number of reconnection attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// How a reconnection loop ended.
#[derive(Debug)]
pub enum ReconnectOutcome<T> {
    /// A connection attempt succeeded.
    Restored(T),
    /// All [`ReconnectConfig::max_attempts`] attempts failed.
    Exhausted,
    /// The cancellation token fired before a connection succeeded.
    Cancelled,
}

/// Retry `connect` with exponential backoff until it succeeds, the
/// attempt ceiling is reached, or `cancel` is triggered.
///
/// Each attempt waits for the current backoff delay first, so a
/// connection that dropped a moment ago is not hammered immediately.
pub async fn reconnect_loop<F, Fut, T, E>(
    mut connect: F,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> ReconnectOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;

    for attempt in 1..=config.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }

        tracing::info!(
            attempt,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to job stream",
        );

        tokio::select! {
            _ = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            result = connect() => {
                match result {
                    Ok(conn) => {
                        tracing::info!(attempt, "Reconnected to job stream");
                        return ReconnectOutcome::Restored(conn);
                    }
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Reconnect attempt failed");
                    }
                }
            }
        }

        delay = next_delay(delay, config);
    }

    tracing::warn!(
        max_attempts = config.max_attempts,
        "Reconnect attempts exhausted",
    );
    ReconnectOutcome::Exhausted
}
