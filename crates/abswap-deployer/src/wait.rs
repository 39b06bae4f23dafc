//! Deadline-bounded polling with cancellation support.
//!
//! Every phase of a swap (scaling activities, fleet health, balancer health)
//! is the same loop: fetch, check, give up at the deadline, sleep. This
//! module provides that loop once, on a fixed cadence, so each phase only
//! supplies its check.

use backon::{BackoffBuilder, ConstantBuilder};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Wall-clock budget for one phase.
///
/// Built on `tokio::time::Instant` so tests running with a paused clock
/// observe virtual time.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    expires: Instant,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            expires: started + budget,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires
    }

    /// Time left before expiry (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.expires.saturating_duration_since(Instant::now())
    }

    /// Time since the deadline was created
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Cadence and bound for one polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Fixed delay between checks
    pub interval: Duration,
    /// When to stop checking
    pub deadline: Deadline,
}

impl PollConfig {
    pub fn new(interval: Duration, deadline: Deadline) -> Self {
        Self { interval, deadline }
    }

    /// Upper bound on how many delays the loop can need before the deadline
    fn max_attempts(&self) -> usize {
        let interval_ms = self.interval.as_millis().max(1);
        let budget_ms = self.deadline.remaining().as_millis();
        usize::try_from(budget_ms / interval_ms)
            .unwrap_or(usize::MAX)
            .saturating_add(1)
    }
}

/// Why a polling loop stopped without the condition becoming true.
#[derive(Debug, thiserror::Error)]
pub enum WaitError<E> {
    #[error("timed out waiting for {what} after {elapsed:?} ({attempts} attempts)")]
    Timeout {
        what: String,
        elapsed: Duration,
        attempts: u32,
    },

    #[error("wait for {what} cancelled")]
    Cancelled { what: String },

    /// The check itself failed; polling stops immediately
    #[error("{0}")]
    Check(E),
}

/// Resolves when `cancel` fires; never resolves without a token.
async fn cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}

/// Sleep for `delay`, returning `false` if `cancel` fires first.
pub async fn sleep_or_cancel(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancelled(cancel) => false,
    }
}

/// Poll `check` until it returns `Ok(true)` or the deadline passes.
///
/// The check always runs at least once, and once more at the deadline if a
/// sleep would otherwise overshoot it, so a condition that becomes true
/// right at the end is still observed. A check still in flight when the
/// deadline passes or `cancel` fires is dropped.
///
/// # Arguments
/// * `config` - Poll interval and deadline
/// * `cancel` - Optional cancellation token
/// * `check` - Async function that returns `Ok(true)` when done, `Ok(false)` to keep polling
/// * `what` - Name for logging and errors
///
/// # Example
/// ```ignore
/// poll_until(
///     PollConfig::new(Duration::from_secs(5), Deadline::after(Duration::from_secs(600))),
///     Some(&cancel),
///     || async { Ok::<_, anyhow::Error>(fleet_is_ready().await) },
///     "svc-a membership",
/// ).await?;
/// ```
pub async fn poll_until<F, Fut, E>(
    config: PollConfig,
    cancel: Option<&CancellationToken>,
    check: F,
    what: &str,
) -> Result<(), WaitError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0u32;
    let mut delays = ConstantBuilder::default()
        .with_delay(config.interval)
        .with_max_times(config.max_attempts())
        .build();

    loop {
        attempts += 1;

        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(WaitError::Cancelled {
                what: what.to_string(),
            });
        }

        let outcome = tokio::select! {
            outcome = tokio::time::timeout(config.deadline.remaining(), check()) => outcome,
            _ = cancelled(cancel) => {
                return Err(WaitError::Cancelled {
                    what: what.to_string(),
                });
            }
        };

        let Ok(outcome) = outcome else {
            warn!(what = %what, attempts, "Check still running at deadline");
            return Err(WaitError::Timeout {
                what: what.to_string(),
                elapsed: config.deadline.elapsed(),
                attempts,
            });
        };

        match outcome {
            Ok(true) => {
                debug!(what = %what, attempts, "Condition met");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                warn!(what = %what, error = %e, "Check failed");
                return Err(WaitError::Check(e));
            }
        }

        if config.deadline.is_expired() {
            return Err(WaitError::Timeout {
                what: what.to_string(),
                elapsed: config.deadline.elapsed(),
                attempts,
            });
        }

        let delay = delays
            .next()
            .unwrap_or(config.interval)
            .min(config.deadline.remaining());
        debug!(
            what = %what,
            attempt = attempts,
            delay_ms = delay.as_millis(),
            "Condition not met, polling again"
        );

        if !sleep_or_cancel(delay, cancel).await {
            return Err(WaitError::Cancelled {
                what: what.to_string(),
            });
        }
    }
}
