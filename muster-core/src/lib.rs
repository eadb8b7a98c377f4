//! # muster
//!
//! Registry-backed name resolution for RPC clients.
//!
//! A [`NameResolver`] watches a well-known path in a coordination-service
//! registry, converts the published `host:port` entries into a server list,
//! and pushes full-replacement updates to an [`AddressListener`] whenever the
//! live server population changes. The listener (typically a load-balancing
//! channel) owns what happens with the addresses; the resolver owns keeping
//! them fresh under node churn, connection loss, and malformed entries.
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
pub use anyhow;
pub use registry_watch;
pub use tokio;
pub use tracing;

pub mod address;
pub mod config;
pub mod error;
pub mod provider;
pub mod resolver;
pub mod target;
mod watcher;

pub use address::{
    AddressListener, EntryParseError, ResolverAttributes, ServerAddr, children_to_addresses,
};
pub use error::ResolveError;
pub use provider::{ProviderRegistry, RegistryResolverProvider, ResolverProvider};
pub use resolver::{NameResolver, SESSION_CONNECT_TIMEOUT};
pub use target::{DEFAULT_SCHEME, Target};
pub use watcher::WatchState;

/// Well-known registry path under which live server entries are published.
///
/// Fixed for the lifetime of the process and must match the value used by
/// the registering side out-of-band. Not configurable at runtime; this is an
/// explicit limitation of the core.
pub const REGISTRY_PATH: &str = "services/hello-world";
