//! Single-assignment outcome cell and the caller-facing handle.
//!
//! # Design
//! The first of {success, timer firing, connection error, terminal auth
//! failure} to call [`OutcomeCell::resolve`] determines the outcome; every
//! later attempt is a no-op. The cell is an atomic `OnceLock` plus a
//! `Notify` — no mutex, so the I/O task and the timer tasks can race to
//! resolve without any lock held across a suspension point. `resolved()`
//! doubles as the cancellation signal: the dispatcher races the exchange
//! against it and drops the transport the instant a timer wins.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{ClientError, ConnectionError};
use crate::http::Response;
use crate::timeout::TimerKind;

/// Terminal result of one logical request.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Response),
    Timeout(TimerKind),
    Connection(ConnectionError),
    AuthFailure,
    /// Local negotiation or construction errors (malformed challenge,
    /// invalid url) that terminate the request without a transport failure.
    Failed(ClientError),
}

impl Outcome {
    pub fn into_result(self) -> Result<Response, ClientError> {
        match self {
            Outcome::Success(resp) => Ok(resp),
            Outcome::Timeout(kind) => Err(ClientError::Timeout(kind)),
            Outcome::Connection(err) => Err(ClientError::Connection(err)),
            Outcome::AuthFailure => Err(ClientError::AuthFailure),
            Outcome::Failed(err) => Err(err),
        }
    }

    pub(crate) fn from_result(result: Result<Response, ClientError>) -> Outcome {
        match result {
            Ok(resp) => Outcome::Success(resp),
            Err(ClientError::Timeout(kind)) => Outcome::Timeout(kind),
            Err(ClientError::Connection(err)) => Outcome::Connection(err),
            Err(ClientError::AuthFailure) => Outcome::AuthFailure,
            Err(other) => Outcome::Failed(other),
        }
    }
}

#[derive(Default)]
struct Inner {
    cell: OnceLock<Outcome>,
    notify: Notify,
}

/// Write-once completion cell shared between the dispatcher, the timers,
/// and the pool reaper.
#[derive(Clone, Default)]
pub(crate) struct OutcomeCell {
    inner: Arc<Inner>,
}

impl OutcomeCell {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// First writer wins. Returns whether this call decided the outcome.
    pub(crate) fn resolve(&self, outcome: Outcome) -> bool {
        let won = self.inner.cell.set(outcome).is_ok();
        if won {
            self.inner.notify.notify_waiters();
        }
        won
    }

    pub(crate) fn peek(&self) -> Option<&Outcome> {
        self.inner.cell.get()
    }

    /// Completes once the outcome is decided, by whichever source.
    pub(crate) async fn resolved(&self) {
        loop {
            if self.inner.cell.get().is_some() {
                return;
            }
            let notified = self.inner.notify.notified();
            // Re-check after registering, so a resolve racing between the
            // first check and `notified()` is not missed.
            if self.inner.cell.get().is_some() {
                return;
            }
            notified.await;
        }
    }

    pub(crate) async fn wait(&self) -> Outcome {
        self.resolved().await;
        self.inner
            .cell
            .get()
            .cloned()
            .unwrap_or(Outcome::AuthFailure)
    }
}

/// Caller-facing handle to an in-flight request.
///
/// Readers may block indefinitely ([`get`](Self::get)), block with their own
/// deadline ([`get_within`](Self::get_within)), or poll
/// ([`try_get`](Self::try_get)). The handle never influences the underlying
/// negotiation — a short caller deadline returns locally while the internal
/// timers keep governing the request.
pub struct ResponseHandle {
    cell: OutcomeCell,
}

impl ResponseHandle {
    pub(crate) fn new(cell: OutcomeCell) -> Self {
        Self { cell }
    }

    /// Wait for the terminal outcome.
    pub async fn get(&self) -> Result<Response, ClientError> {
        self.cell.wait().await.into_result()
    }

    /// Wait at most `limit`. `None` means the caller-supplied deadline
    /// elapsed; the request itself continues until an internal timer or the
    /// server resolves it.
    pub async fn get_within(&self, limit: Duration) -> Option<Result<Response, ClientError>> {
        tokio::time::timeout(limit, self.cell.wait())
            .await
            .ok()
            .map(Outcome::into_result)
    }

    /// Non-blocking snapshot of the outcome, if already decided.
    pub fn try_get(&self) -> Option<Result<Response, ClientError>> {
        self.cell.peek().cloned().map(Outcome::into_result)
    }
}
