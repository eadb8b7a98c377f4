//! # registry-watch
//!
//! Coordination-service registry capability used by the muster resolver.
//!
//! This library provides:
//! - **`Registry` trait** exposing the narrow capability the resolver needs:
//!   read the children of a path, install a one-shot children watch, and
//!   observe session state.
//! - **Typed errors** distinguishing a missing path from transport failures.
//! - **`MemoryRegistry`**, an in-process backend for tests and local runs.
//! - **`NatsRegistry`**, a live backend over NATS JetStream KV.
//!
//! ## Design Principles
//!
//! - The registry is observation-only through the trait: consumers never
//!   create or delete entries, they watch what registrants publish.
//! - Watches are one-shot. Every fired watch must be re-installed by the
//!   caller or further changes become invisible.
//! - Session state is owned by the backend; consumers get state-change
//!   events, not a handle to mutate the session.
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

use async_trait::async_trait;

pub mod config;
pub mod error;
pub mod memory;
pub mod nats;

pub use config::RegistryConfig;
pub use error::{RegistryError, RegistryResult};
pub use memory::MemoryRegistry;
pub use nats::NatsRegistry;

/// Session state of the connection to the coordination service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session establishment is in progress.
    Connecting,
    /// Connected and operating normally.
    Connected,
    /// The session expired on the server side and must be re-established.
    Expired,
    /// Not connected; the session was never established or has been lost.
    Disconnected,
}

/// A single fired watch notification.
///
/// Children-changed and session-state events are deliberately distinct:
/// only the former warrants a re-read of the children list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The children of the watched path changed (entry added or removed).
    ChildrenChanged,
    /// The session transitioned to a new state.
    Session(SessionState),
}

/// The coordination-service registry capability.
///
/// Implementations hold the session to the coordination service and expose
/// exactly three operations: a blocking session establishment, a snapshot
/// read of a path's children, and a one-shot children watch.
///
/// Watches fire at most once. After handling an event the caller must call
/// [`watch_children`](Registry::watch_children) again, including on the error
/// path of any read the event triggered.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Establish the session to the coordination service.
    ///
    /// Blocks until the session reaches [`SessionState::Connected`] or
    /// permanently fails. No children read is meaningful before this
    /// returns.
    async fn connect(&self) -> RegistryResult<()>;

    /// Returns the current session state.
    async fn session_state(&self) -> SessionState;

    /// Returns the current child names of `path`.
    ///
    /// Fails with [`RegistryError::PathNotFound`] when the path does not
    /// exist, which callers should treat as recoverable.
    async fn read_children(&self, path: &str) -> RegistryResult<Vec<String>>;

    /// Install a one-shot watch on `path` and wait for the next event.
    ///
    /// Resolves with [`WatchEvent::ChildrenChanged`] when the child list
    /// changes, or [`WatchEvent::Session`] when the session state changes.
    ///
    /// Changes made while no watch was installed are not lost: the next
    /// installation observes them and fires immediately. Backends keep a
    /// cursor over their change feed to honor this.
    async fn watch_children(&self, path: &str) -> RegistryResult<WatchEvent>;
}
