//! Connection health bookkeeping for a single response body.
//!
//! # Design
//! Tracks the declared content length against bytes actually delivered.
//! `received` only advances with received bytes, so the invariant
//! `received <= declared` while open holds by construction; the interesting
//! moment is closure. A shortfall at closure is a premature closure — the
//! remote actively terminated the stream — and is classified as a
//! connection error, never reinterpreted as a timeout.

use crate::error::ConnectionError;

/// Declared-versus-delivered state for one response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferState {
    declared: Option<u64>,
    received: u64,
}

impl TransferState {
    pub fn new(declared: Option<u64>) -> Self {
        Self {
            declared,
            received: 0,
        }
    }

    pub fn record(&mut self, bytes: usize) {
        self.received += bytes as u64;
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// All declared bytes have arrived. Always false while the declared
    /// length is unknown — those bodies end only at closure.
    pub fn is_complete(&self) -> bool {
        self.declared.map_or(false, |n| self.received >= n)
    }

    /// The transport signaled closure. A known declared length with a
    /// shortfall is a premature closure; anything else is a normal
    /// end-of-response. Consumes the state: nothing can be recorded against
    /// a closed transfer.
    pub fn close(self) -> Result<(), ConnectionError> {
        match self.declared {
            Some(declared) if self.received < declared => {
                tracing::warn!(declared, received = self.received, "premature closure");
                Err(ConnectionError::RemotelyClosed {
                    declared,
                    received: self.received,
                })
            }
            _ => Ok(()),
        }
    }
}
