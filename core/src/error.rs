//! Error types for the client core.
//!
//! # Design
//! `Connection(ConnectionError)` is transparent so the inner message reaches
//! the caller unchanged — callers pattern-match on the `"Remotely Closed"`
//! prefix of premature-closure errors, and wrapping it in an outer message
//! would break that contract. `Timeout` and `AuthFailure` get dedicated
//! variants because callers distinguish "the deadline elapsed" from "the
//! server actively refused the credentials."

use std::io;

use thiserror::Error;

use crate::timeout::TimerKind;

/// Terminal errors surfaced by [`ResponseHandle::get`](crate::ResponseHandle::get).
///
/// Cloneable so a terminal error can sit in the shared outcome cell and be
/// handed to every reader.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// An internal timer fired before the request completed.
    #[error("{0} timeout elapsed")]
    Timeout(TimerKind),

    /// The transport failed; see [`ConnectionError`] for the diagnosis.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The server rejected the credentialed retry — no further attempts.
    #[error("authentication failed: no credentials accepted")]
    AuthFailure,

    /// The challenge header could not be parsed into a known scheme.
    #[error("malformed challenge: {0}")]
    MalformedChallenge(String),

    /// Realm construction was rejected (empty principal or secret).
    #[error("invalid realm: {0}")]
    InvalidRealm(String),

    /// The request URL could not be split into host, port, and path.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Transport-level failures, cloneable so they can live in the shared
/// outcome cell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The remote peer closed the connection before delivering the number
    /// of bytes it declared. The message prefix is a binding contract.
    #[error("Remotely Closed connection: received {received} of {declared} declared bytes")]
    RemotelyClosed { declared: u64, received: u64 },

    /// The connection was reset by the peer.
    #[error("connection reset by peer")]
    Reset,

    /// The remote host refused the connection.
    #[error("connection refused")]
    Refused,

    /// Any other transport failure, carried as its message.
    #[error("i/o error: {0}")]
    Io(String),
}

impl ConnectionError {
    /// Classify a raw I/O error into the taxonomy callers match on.
    pub(crate) fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ConnectionError::Refused,
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => ConnectionError::Reset,
            _ => ConnectionError::Io(err.to_string()),
        }
    }
}
