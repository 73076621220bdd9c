//! Per-request timers and their race to resolve the outcome.
//!
//! # Design
//! Each armed timer is an independent tokio task sleeping until its
//! deadline, then attempting to resolve the shared outcome cell. Whichever
//! source resolves first wins; a timer firing on an already-resolved cell
//! is a no-op. Timers never touch the socket directly — resolution wakes
//! the dispatcher, which drops (and thereby closes) the transport, so timer
//! firing never blocks on I/O and vice versa. Dropping the [`TimerGuard`]
//! disarms the timer.

use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::outcome::{Outcome, OutcomeCell};

/// Which deadline fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Connection establishment took too long.
    Connect,
    /// The whole logical exchange (including any auth retry) took too long.
    Request,
    /// A pooled connection sat unused past its idle budget.
    Idle,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::Connect => write!(f, "connect"),
            TimerKind::Request => write!(f, "request"),
            TimerKind::Idle => write!(f, "idle"),
        }
    }
}

/// Arms timers against one request's outcome cell.
pub(crate) struct TimeoutSupervisor {
    cell: OutcomeCell,
}

impl TimeoutSupervisor {
    pub(crate) fn new(cell: OutcomeCell) -> Self {
        Self { cell }
    }

    /// Start an independent timer. It races every other resolution source;
    /// drop the returned guard to disarm it.
    pub(crate) fn arm(&self, kind: TimerKind, after: Duration) -> TimerGuard {
        let cell = self.cell.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if cell.resolve(Outcome::Timeout(kind)) {
                tracing::debug!(timer = %kind, ?after, "timer fired");
            }
        });
        TimerGuard { handle }
    }
}

/// Disarms its timer on drop.
pub(crate) struct TimerGuard {
    handle: JoinHandle<()>,
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
