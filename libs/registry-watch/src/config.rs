//! Backend configuration for the live registry connection.

use std::time::Duration;

/// Default session timeout requested from the coordination service.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout for a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of connection retries after the first failed attempt.
pub const DEFAULT_CONNECT_RETRY_MAX: u32 = 2;

/// Configuration for the NATS-backed registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Coordination-service server URLs, e.g. `nats://127.0.0.1:4222`.
    pub servers: Vec<String>,
    /// Session timeout used to detect a dead client.
    pub session_timeout: Duration,
    /// Timeout for a single connection attempt.
    pub connect_timeout: Duration,
    /// Retries after the first failed connection attempt.
    pub connect_retry_max: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://127.0.0.1:4222".into()],
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connect_retry_max: DEFAULT_CONNECT_RETRY_MAX,
        }
    }
}

impl RegistryConfig {
    /// Config pointing at a single ensemble address (`host:port`).
    pub fn for_ensemble(authority: &str) -> Self {
        Self {
            servers: vec![format!("nats://{authority}")],
            ..Default::default()
        }
    }

    /// Set the per-attempt connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the number of connection retries.
    #[must_use]
    pub fn connect_retry_max(mut self, retries: u32) -> Self {
        self.connect_retry_max = retries;
        self
    }
}
