// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deadline-bounded, cancellable polling

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Overall time budget plus the cadence between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollSchedule {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn from_secs(timeout_secs: u64, interval_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(timeout_secs),
            Duration::from_secs(interval_secs),
        )
    }

    /// Deadline for a wait starting now
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }
}

/// Result of [`poll_until`]
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome<T, E> {
    Ready(T),
    /// Deadline reached; carries the cause reported by the last completed attempt
    TimedOut(Option<E>),
    Cancelled,
}

/// Sleep for `duration` unless `cancel` fires first. Returns false when cancelled.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}

/// Run `poll_fn` until it returns `Ok`, the schedule's deadline passes, or `cancel` fires.
///
/// An `Err` from `poll_fn` means "not yet" and is kept as the cause reported on timeout.
/// The deadline is wall-clock: a slow attempt is cut off when the deadline passes and the
/// sleep between attempts never runs past it.
pub async fn poll_until<T, E, F, Fut>(
    schedule: &PollSchedule,
    cancel: &CancellationToken,
    mut poll_fn: F,
) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let deadline = schedule.deadline();
    let mut last_cause = None;
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }
        attempt += 1;

        let result = tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            result = timeout_at(deadline, poll_fn()) => result,
        };

        match result {
            Ok(Ok(value)) => return PollOutcome::Ready(value),
            Ok(Err(cause)) => {
                debug!(attempt, "Poll attempt not ready: {}", cause);
                last_cause = Some(cause);
            }
            Err(_) => return PollOutcome::TimedOut(last_cause),
        }

        let now = Instant::now();
        if now >= deadline {
            return PollOutcome::TimedOut(last_cause);
        }
        if !sleep_or_cancel(schedule.interval.min(deadline - now), cancel).await {
            return PollOutcome::Cancelled;
        }
    }
}
