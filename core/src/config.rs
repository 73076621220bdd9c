//! Client configuration.
//!
//! # Design
//! All knobs are explicit constructor parameters — no ambient or global
//! state. The three durations govern the three timer kinds one-to-one;
//! the optional realm is the default credential store, overridable per
//! request. Serde derives let the config come from a file when embedding
//! applications want that.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::realm::Realm;

/// Recognized options and the timers they govern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Governs the connect deadline.
    pub connect_timeout: Duration,
    /// Governs the total-request deadline, covering the whole logical
    /// exchange including any auth retry.
    pub request_timeout: Duration,
    /// Governs the idle deadline of pooled connections; `None` disables
    /// pooling entirely.
    pub pooled_connection_idle_timeout: Option<Duration>,
    /// Default credential store; a per-request realm takes precedence.
    pub realm: Option<Realm>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(60),
            pooled_connection_idle_timeout: None,
            realm: None,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn pooled_connection_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pooled_connection_idle_timeout = Some(timeout);
        self
    }

    pub fn realm(mut self, realm: Realm) -> Self {
        self.config.realm = Some(realm);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
