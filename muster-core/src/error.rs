//! Error types for the resolver core.
//!
//! Only the synchronous phase of [`NameResolver::start`] can fail to the
//! caller. Everything after the first address delivery is terminal to that
//! watch cycle only: logged, never propagated.
//!
//! [`NameResolver::start`]: crate::resolver::NameResolver::start

use std::time::Duration;

use registry_watch::RegistryError;
use thiserror::Error;

/// Errors surfaced by [`NameResolver::start`](crate::resolver::NameResolver::start)
/// and target parsing.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The registry session could not be established.
    #[error("registry connection failed: {0}")]
    Connection(#[from] RegistryError),

    /// The session-connect gate timed out before the session was confirmed.
    #[error("timed out after {0:?} waiting for the registry session")]
    ConnectTimeout(Duration),

    /// `start` was called more than once on the same resolver.
    #[error("resolver already started")]
    AlreadyStarted,

    /// The target string is not a valid `scheme://host:port` identifier.
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget {
        /// The rejected target string.
        target: String,
        /// Why it was rejected.
        reason: String,
    },
}
