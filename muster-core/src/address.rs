//! Server entries, endpoint addresses, and the listener contract.
//!
//! Registry children are literal `host:port` strings published by server
//! instances. Conversion into [`ServerAddr`] values is lossy by design:
//! malformed entries are logged and skipped without aborting the batch.

use std::collections::HashMap;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, warn};

/// A resolved server endpoint, one per parseable registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddr {
    host: String,
    port: u16,
}

impl ServerAddr {
    /// Build an address from parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Why a registry entry failed to parse as `host:port`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryParseError {
    /// No `:` separator in the entry.
    #[error("missing ':' separator in entry {0:?}")]
    MissingPort(String),

    /// Nothing before the separator.
    #[error("empty host in entry {0:?}")]
    EmptyHost(String),

    /// The text after the separator is not a valid port number.
    #[error("invalid port in entry {0:?}: {1}")]
    InvalidPort(String, #[source] ParseIntError),
}

impl FromStr for ServerAddr {
    type Err = EntryParseError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        // rsplit so IPv6 literals keep their colons on the host side
        let (host, port) = entry
            .rsplit_once(':')
            .ok_or_else(|| EntryParseError::MissingPort(entry.to_string()))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(EntryParseError::EmptyHost(entry.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|err| EntryParseError::InvalidPort(entry.to_string(), err))?;
        Ok(Self::new(host, port))
    }
}

/// Convert a children snapshot into the parseable subset of addresses.
///
/// Every parseable entry appears exactly once; duplicates collapse. A
/// malformed entry produces one log event and is skipped, it never aborts
/// the batch or affects sibling entries.
pub fn children_to_addresses(children: &[String]) -> Vec<ServerAddr> {
    let mut addrs = Vec::with_capacity(children.len());
    for entry in children {
        match entry.parse::<ServerAddr>() {
            Ok(addr) => {
                if addrs.contains(&addr) {
                    debug!(%entry, "duplicate server entry collapsed");
                } else {
                    debug!(%entry, "server online");
                    addrs.push(addr);
                }
            }
            Err(err) => warn!(%entry, %err, "skipping unparsable server entry"),
        }
    }
    addrs
}

/// Extensibility bag passed alongside each address delivery.
///
/// Unused by this core beyond passing an empty value; consumers may attach
/// metadata in their own providers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverAttributes(HashMap<String, String>);

impl ResolverAttributes {
    /// An empty attribute bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no attributes are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Attach an attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up an attribute.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Consumer of resolved address sets.
///
/// `on_addresses` is invoked from the resolver's single watcher task with a
/// full replacement of the previous set, which is always non-empty. The
/// implementation must not block: hand the update off to the transport
/// layer instead of processing it in place.
pub trait AddressListener: Send + Sync + 'static {
    /// Receive a full replacement of the current server population.
    fn on_addresses(&self, addresses: Vec<ServerAddr>, attributes: ResolverAttributes);
}
