//! The name-to-address resolution contract consumed by the RPC transport.
//!
//! A [`NameResolver`] owns a registry backend and a re-arming watcher. After
//! [`start`](NameResolver::start) returns, the registered listener receives a
//! full-replacement address set on every membership change, with one
//! deliberate exception: an empty snapshot is never delivered. A registry
//! blip that transiently empties the server list must not strand the
//! transport layer with zero addresses, so the listener keeps its last known
//! good set until a non-empty one arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use registry_watch::Registry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::REGISTRY_PATH;
use crate::address::{AddressListener, ResolverAttributes, ServerAddr, children_to_addresses};
use crate::error::ResolveError;
use crate::target::Target;
use crate::watcher::{RegistryWatcher, WatchState};

/// Bounded wait for the session to reach Connected during `start`.
pub const SESSION_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Guarded delivery into the listener: replace on non-empty, retain on
/// empty.
struct AddressSink {
    listener: Arc<dyn AddressListener>,
    last_good: Mutex<Option<Vec<ServerAddr>>>,
}

impl AddressSink {
    fn new(listener: Arc<dyn AddressListener>) -> Self {
        Self {
            listener,
            last_good: Mutex::new(None),
        }
    }

    fn publish(&self, children: &[String]) {
        let addrs = children_to_addresses(children);
        if addrs.is_empty() {
            // availability over freshness: keep the last known good set
            info!("no servers online, keep looking");
            return;
        }
        debug!(count = addrs.len(), "delivering updated server list");
        *self.last_good.lock().expect("address sink lock poisoned") = Some(addrs.clone());
        self.listener
            .on_addresses(addrs, ResolverAttributes::default());
    }

    fn last(&self) -> Option<Vec<ServerAddr>> {
        self.last_good
            .lock()
            .expect("address sink lock poisoned")
            .clone()
    }
}

/// Resolves a logical service name into the live server population
/// published under [`REGISTRY_PATH`].
pub struct NameResolver<R> {
    target: Target,
    registry: Arc<R>,
    watcher: Arc<RegistryWatcher<R>>,
    session_timeout: Duration,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    sink: Mutex<Option<Arc<AddressSink>>>,
}

impl<R: Registry> NameResolver<R> {
    /// Create a resolver for `target` backed by `registry`. No connection
    /// is made until [`start`](NameResolver::start).
    pub fn new(target: Target, registry: R) -> Self {
        let registry = Arc::new(registry);
        Self {
            watcher: Arc::new(RegistryWatcher::new(Arc::clone(&registry), REGISTRY_PATH)),
            registry,
            target,
            session_timeout: SESSION_CONNECT_TIMEOUT,
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
            started: AtomicBool::new(false),
            sink: Mutex::new(None),
        }
    }

    /// Override the session-connect gate timeout.
    #[must_use]
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// The logical identifier portion of the resolution target. Pure and
    /// stateless: callable any time after construction, independent of any
    /// live addresses.
    pub fn authority(&self) -> &str {
        self.target.authority()
    }

    /// The full resolution target.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The most recently delivered address set, or `None` when no
    /// resolution has happened yet. Never `Some` of an empty set: empty
    /// snapshots are retained away, not delivered.
    pub fn last_addresses(&self) -> Option<Vec<ServerAddr>> {
        self.sink
            .lock()
            .expect("resolver sink lock poisoned")
            .as_ref()
            .map(|sink| sink.last())
            .unwrap_or(None)
    }

    /// Completed watch fire-and-rearm cycles, for observability.
    pub fn watch_cycles(&self) -> u64 {
        self.watcher.cycles()
    }

    /// Current position of the watcher in its renewal cycle.
    pub fn watch_state(&self) -> WatchState {
        self.watcher.state()
    }

    /// One-shot initialization: establish the session, read and deliver
    /// the initial address set, and install the recurring watch.
    ///
    /// Blocks until the session reaches Connected, bounded by the
    /// session-connect gate. An absent registry path is recoverable and
    /// logged, not an error. Calling `start` a second time fails with
    /// [`ResolveError::AlreadyStarted`].
    pub async fn start(&self, listener: Arc<dyn AddressListener>) -> Result<(), ResolveError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ResolveError::AlreadyStarted);
        }

        info!(authority = %self.target.authority(), "establishing registry session");
        match tokio::time::timeout(self.session_timeout, self.registry.connect()).await {
            Ok(Ok(())) => info!("registry session established"),
            Ok(Err(err)) => {
                error!(%err, "failed to establish registry session");
                return Err(ResolveError::Connection(err));
            }
            Err(_) => {
                error!(
                    timeout = ?self.session_timeout,
                    "timed out waiting for the registry session"
                );
                return Err(ResolveError::ConnectTimeout(self.session_timeout));
            }
        }

        let sink = Arc::new(AddressSink::new(listener));
        *self.sink.lock().expect("resolver sink lock poisoned") = Some(Arc::clone(&sink));

        match self.registry.read_children(REGISTRY_PATH).await {
            Ok(children) => sink.publish(&children),
            Err(err) if err.is_path_not_found() => {
                info!(path = REGISTRY_PATH, "registry path does not exist yet");
            }
            Err(err) => warn!(path = REGISTRY_PATH, %err, "initial children read failed"),
        }

        let watcher = Arc::clone(&self.watcher);
        let token = self.shutdown.clone();
        let task = tokio::spawn(async move {
            watcher
                .run(token, move |children| sink.publish(children))
                .await;
        });
        *self.task.lock().expect("resolver task lock poisoned") = Some(task);
        Ok(())
    }

    /// Release resolver-held resources: stop the watcher task. Best-effort
    /// and infallible; does not synchronously close the backend session
    /// (known limitation).
    pub async fn shutdown(&self) {
        debug!(authority = %self.target.authority(), "shutting down resolver");
        self.shutdown.cancel();
        let task = self
            .task
            .lock()
            .expect("resolver task lock poisoned")
            .take();
        if let Some(task) = task {
            task.abort();
            // join errors only reflect the abort; shutdown never fails
            let _ = task.await;
        }
    }
}

impl<R> std::fmt::Debug for NameResolver<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameResolver")
            .field("target", &self.target)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
