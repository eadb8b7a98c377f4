//! Resolver target parsing.
//!
//! A target is a scheme-qualified identifier, `scheme://host:port`, whose
//! authority names the coordination-service ensemble to connect to. The
//! scheme is a free-form label claimed by a resolver provider, see
//! [`crate::provider`].

use std::fmt;
use std::str::FromStr;

use crate::error::ResolveError;

/// Scheme claimed by the registry-backed resolver.
pub const DEFAULT_SCHEME: &str = "muster";

/// A parsed resolver target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    scheme: String,
    authority: String,
}

impl Target {
    /// Build a target from already-validated parts.
    pub fn new(scheme: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            authority: authority.into(),
        }
    }

    /// The scheme label, e.g. `muster`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The authority portion naming the coordination ensemble, e.g.
    /// `127.0.0.1:4222`. Independent of any live server addresses.
    pub fn authority(&self) -> &str {
        &self.authority
    }
}

impl FromStr for Target {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ResolveError::InvalidTarget {
            target: s.to_string(),
            reason: reason.to_string(),
        };
        let (scheme, authority) = s
            .split_once("://")
            .ok_or_else(|| invalid("expected '<scheme>://<host:port>'"))?;
        if scheme.is_empty() {
            return Err(invalid("empty scheme"));
        }
        if authority.is_empty() {
            return Err(invalid("empty authority"));
        }
        Ok(Self::new(scheme, authority))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}
