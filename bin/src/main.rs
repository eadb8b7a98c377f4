use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};

use muster_core::{
    AddressListener, ProviderRegistry, REGISTRY_PATH, RegistryResolverProvider,
    ResolverAttributes, ServerAddr, Target,
    config::{
        cli::{self, Parser},
        trace,
    },
    tokio::{self, runtime::Builder, signal},
    tracing::*,
};
use registry_watch::{NatsRegistry, Registry, RegistryConfig};

/// tokio worker thread name
static THREAD_NAME: &str = "muster-resolver-worker";

fn main() -> Result<()> {
    // parses from cli or environment var
    let config = cli::Config::parse();
    let trace_config = trace::Config::parse(&config.muster_log)?;
    debug!(?config, ?trace_config);

    let Some(target) = config.target.clone() else {
        println!("Usage: muster [--announce HOST:PORT] <scheme>://HOST:PORT");
        println!("  resolves the live server list published under {REGISTRY_PATH}");
        return Ok(());
    };

    let rt = Builder::new_multi_thread()
        .thread_name(THREAD_NAME)
        .enable_all()
        .build()?;

    rt.block_on(async move {
        match tokio::spawn(async move { start(config, target).await }).await {
            Err(err) => error!(?err, "failed to start resolver"),
            Ok(Err(err)) => error!(?err, "exited with error"),
            Ok(_) => debug!("exiting..."),
        }
    });

    Ok(())
}

async fn start(config: cli::Config, target: String) -> Result<()> {
    let target: Target = target.parse()?;

    match config.announce {
        Some(entry) => announce(target, &entry).await,
        None => resolve(target).await,
    }
}

/// Publish a server entry under the well-known path and hold it until
/// interrupted, standing in for a real server instance.
async fn announce(target: Target, entry: &str) -> Result<()> {
    entry
        .parse::<ServerAddr>()
        .map_err(|err| anyhow!("invalid --announce entry {entry:?}: {err}"))?;

    let registry = NatsRegistry::new(RegistryConfig::for_ensemble(target.authority()));
    registry.connect().await?;
    registry.register(REGISTRY_PATH, entry).await?;
    info!(entry, path = REGISTRY_PATH, "announcing, press ctrl-c to go offline");

    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    registry.deregister(REGISTRY_PATH, entry).await?;
    Ok(())
}

/// Resolve the live server list and log a round-robin pick on every update,
/// standing in for the load-balancing channel that would consume it.
async fn resolve(target: Target) -> Result<()> {
    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(RegistryResolverProvider));

    let provider = providers
        .provider_for(target.scheme())
        .ok_or_else(|| anyhow!("no resolver provider claims scheme '{}'", target.scheme()))?;
    let resolver = provider
        .new_resolver(&target)
        .ok_or_else(|| anyhow!("provider refused target '{target}'"))?;
    info!(authority = resolver.authority(), "starting resolution");

    resolver.start(Arc::new(RoundRobinListener::default())).await?;
    info!("resolver running, press ctrl-c to stop");

    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    resolver.shutdown().await;
    Ok(())
}

/// Demo listener: keeps the current set and logs which server a round-robin
/// balancer would dial next.
#[derive(Debug, Default)]
struct RoundRobinListener {
    state: Mutex<(Vec<ServerAddr>, usize)>,
}

impl AddressListener for RoundRobinListener {
    fn on_addresses(&self, addresses: Vec<ServerAddr>, _attributes: ResolverAttributes) {
        let mut state = self.state.lock().expect("listener lock poisoned");
        let (servers, next) = &mut *state;
        *servers = addresses;
        *next %= servers.len().max(1);
        // delivered sets are never empty; tolerate one anyway rather than
        // aborting the demo on an index panic
        let Some(pick) = servers.get(*next) else {
            warn!("empty server list delivered, nothing to pick");
            return;
        };
        info!(servers = servers.len(), %pick, "server list updated");
        *next += 1;
    }
}
