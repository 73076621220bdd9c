//! Idle-connection pool with the idle-timeout contract.
//!
//! # Design
//! Connections are keyed by `host:port`. Checking one in arms a detached
//! reaper task: when the idle budget elapses without a checkout, the
//! connection is closed and `Timeout(Idle)` is offered to the outcome cell
//! of the request that last used it — a no-op whenever that request already
//! resolved, which is the common case. Checkout removes the entry, which
//! the reaper detects by id, so any read/write activity on a reused
//! connection implicitly resets the idle clock. Connections that reported a
//! health failure are never checked in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::outcome::{Outcome, OutcomeCell};
use crate::timeout::TimerKind;
use crate::transport::Connection;

pub(crate) struct Pool {
    idle: Arc<Mutex<HashMap<String, Vec<Connection>>>>,
    idle_timeout: Option<Duration>,
}

impl Pool {
    pub(crate) fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            idle: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
        }
    }

    /// Take an idle connection for `key`, if any survives.
    pub(crate) fn checkout(&self, key: &str) -> Option<Connection> {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        let conn = idle.get_mut(key)?.pop();
        if let Some(conn) = &conn {
            tracing::debug!(conn = conn.id(), key, "pool checkout");
        }
        conn
    }

    /// Return a healthy connection and arm its idle reaper. `cell` is the
    /// outcome of the request that just finished on this connection.
    pub(crate) fn checkin(&self, key: &str, conn: Connection, cell: OutcomeCell) {
        if !conn.is_clean() {
            tracing::debug!(conn = conn.id(), "discarding connection with buffered bytes");
            return;
        }
        let Some(idle_timeout) = self.idle_timeout else {
            return;
        };
        let id = conn.id();
        tracing::debug!(conn = id, key, "pool checkin");
        {
            let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.entry(key.to_string()).or_default().push(conn);
        }

        let map = Arc::clone(&self.idle);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            let expired = {
                let mut idle = map.lock().unwrap_or_else(|e| e.into_inner());
                idle.get_mut(&key).and_then(|conns| {
                    conns
                        .iter()
                        .position(|c| c.id() == id)
                        .map(|pos| conns.remove(pos))
                })
            };
            if let Some(conn) = expired {
                tracing::debug!(conn = id, "idle timeout, closing pooled connection");
                conn.close().await;
                // Only reported if nothing else resolved the request first.
                cell.resolve(Outcome::Timeout(TimerKind::Idle));
            }
        });
    }
}
