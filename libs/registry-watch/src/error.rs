//! Error types for registry operations.
//!
//! Provides typed error variants so that consumers (the resolver core) can
//! distinguish a missing registry path from transport-level failures without
//! leaking backend internals.

use thiserror::Error;

/// Top-level error type for the registry-watch crate.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A session to the coordination service could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// Operation timed out waiting for the coordination service.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The registry path does not exist. Recoverable: the path may be
    /// created later by a registrant.
    #[error("registry path not found: {0}")]
    PathNotFound(String),

    /// The client is not connected or the session was lost.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// Any other coordination-service failure during a read or watch.
    #[error("transport error: {0}")]
    Transport(String),

    /// The watch or session channel closed and no further events will be
    /// delivered.
    #[error("registry closed: {0}")]
    Closed(String),
}

impl RegistryError {
    /// Returns true if this error indicates a transient failure that may
    /// succeed on retry (transport, timeout, or lost connection).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::Transport(_)
                | RegistryError::Timeout(_)
                | RegistryError::NotConnected(_)
        )
    }

    /// Returns true if this error is a missing registry path.
    pub fn is_path_not_found(&self) -> bool {
        matches!(self, RegistryError::PathNotFound(_))
    }

    /// Returns true if this error is a failed session establishment.
    pub fn is_connection(&self) -> bool {
        matches!(self, RegistryError::Connection(_))
    }
}

/// Shorthand result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
