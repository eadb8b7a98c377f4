//! Resolver provider registration.
//!
//! A provider claims a target scheme and acts as the resolver factory for
//! targets carrying it. Several providers may claim the same scheme; the
//! priority value is the tie-break, lower specificity wins. This mirrors
//! how RPC channel builders discover pluggable resolver implementations
//! without hard-wiring one.

use std::sync::Arc;

use registry_watch::{NatsRegistry, RegistryConfig};

use crate::resolver::NameResolver;
use crate::target::{DEFAULT_SCHEME, Target};

/// Default provider priority. Lower values win a tie-break among providers
/// claiming the same scheme.
pub const DEFAULT_PROVIDER_PRIORITY: u8 = 5;

/// A resolver implementation claiming a scheme.
pub trait ResolverProvider: Send + Sync {
    /// The scheme label this provider claims, e.g. `muster`.
    fn scheme(&self) -> &str;

    /// Tie-break priority among providers of the same scheme; lower wins.
    fn priority(&self) -> u8 {
        DEFAULT_PROVIDER_PRIORITY
    }

    /// Whether this provider can currently produce resolvers. Default
    /// plausibility is always true.
    fn is_available(&self) -> bool {
        true
    }

    /// Build a resolver for `target`, or `None` when this provider does
    /// not claim the target's scheme. The resolver is not started.
    fn new_resolver(&self, target: &Target) -> Option<NameResolver<NatsRegistry>>;
}

/// The registry-backed provider shipped by this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryResolverProvider;

impl ResolverProvider for RegistryResolverProvider {
    fn scheme(&self) -> &str {
        DEFAULT_SCHEME
    }

    fn new_resolver(&self, target: &Target) -> Option<NameResolver<NatsRegistry>> {
        if target.scheme() != self.scheme() {
            return None;
        }
        // the authority names the registry ensemble, not a server instance
        let registry = NatsRegistry::new(RegistryConfig::for_ensemble(target.authority()));
        Some(NameResolver::new(target.clone(), registry))
    }
}

/// Set of registered providers, queried by scheme.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ResolverProvider>>,
}

impl ProviderRegistry {
    /// An empty provider set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider.
    pub fn register(&mut self, provider: Arc<dyn ResolverProvider>) {
        self.providers.push(provider);
    }

    /// Pick the available provider with the lowest priority for `scheme`.
    pub fn provider_for(&self, scheme: &str) -> Option<Arc<dyn ResolverProvider>> {
        self.providers
            .iter()
            .filter(|p| p.is_available() && p.scheme() == scheme)
            .min_by_key(|p| p.priority())
            .cloned()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.len())
            .finish()
    }
}
