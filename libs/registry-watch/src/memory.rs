//! In-process registry backend.
//!
//! Holds the children map in memory and signals watches through channels.
//! Used by the resolver test-suite and by local demos that have no
//! coordination service to talk to. Mutator methods stand in for the
//! external registrants that would otherwise create and remove entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::{Registry, SessionState, WatchEvent};

/// In-memory registry of path → children with watch signalling.
#[derive(Clone)]
pub struct MemoryRegistry {
    children: Arc<Mutex<HashMap<String, Vec<String>>>>,
    version: Arc<watch::Sender<u64>>,
    session: Arc<watch::Sender<SessionState>>,
    seen_version: Arc<AtomicU64>,
    fail_reads: Arc<AtomicU32>,
    refuse_connect: Arc<AtomicBool>,
    stall_connect: Arc<AtomicBool>,
}

impl MemoryRegistry {
    /// Create an empty registry with no established session.
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (session, _) = watch::channel(SessionState::Disconnected);
        Self {
            children: Arc::new(Mutex::new(HashMap::new())),
            version: Arc::new(version),
            session: Arc::new(session),
            seen_version: Arc::new(AtomicU64::new(0)),
            fail_reads: Arc::new(AtomicU32::new(0)),
            refuse_connect: Arc::new(AtomicBool::new(false)),
            stall_connect: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the full child list of `path`, creating the path if absent.
    pub fn set_children(&self, path: &str, entries: Vec<String>) {
        self.children
            .lock()
            .expect("memory registry lock poisoned")
            .insert(path.to_string(), entries);
        self.bump();
    }

    /// Add a single child entry under `path`, creating the path if absent.
    pub fn add_child(&self, path: &str, entry: &str) {
        self.children
            .lock()
            .expect("memory registry lock poisoned")
            .entry(path.to_string())
            .or_default()
            .push(entry.to_string());
        self.bump();
    }

    /// Remove a child entry from `path`. Removing an absent entry is a no-op
    /// and fires no notification.
    pub fn remove_child(&self, path: &str, entry: &str) {
        let removed = {
            let mut guard = self.children.lock().expect("memory registry lock poisoned");
            match guard.get_mut(path) {
                Some(entries) => {
                    let before = entries.len();
                    entries.retain(|e| e != entry);
                    before != entries.len()
                }
                None => false,
            }
        };
        if removed {
            self.bump();
        }
    }

    /// Drop the path entirely, so subsequent reads see `PathNotFound`.
    pub fn remove_path(&self, path: &str) {
        self.children
            .lock()
            .expect("memory registry lock poisoned")
            .remove(path);
        self.bump();
    }

    /// Transition the simulated session and notify session watchers.
    pub fn set_session_state(&self, state: SessionState) {
        self.session.send_replace(state);
    }

    /// Make the next `n` children reads fail with a transport error.
    pub fn fail_next_reads(&self, n: u32) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    /// Make `connect` fail instead of establishing the session.
    pub fn refuse_connections(&self) {
        self.refuse_connect.store(true, Ordering::SeqCst);
    }

    /// Make `connect` block forever, for exercising connect timeouts.
    pub fn stall_connections(&self) {
        self.stall_connect.store(true, Ordering::SeqCst);
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRegistry")
            .field("paths", &self.children.lock().map(|c| c.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn connect(&self) -> RegistryResult<()> {
        if self.stall_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(RegistryError::Connection(
                "memory registry is refusing connections".into(),
            ));
        }
        self.session.send_replace(SessionState::Connected);
        // session establishment is the observation baseline; mutations made
        // before connect do not fire the first watch
        self.seen_version
            .store(*self.version.borrow(), Ordering::SeqCst);
        debug!("memory registry session established");
        Ok(())
    }

    async fn session_state(&self) -> SessionState {
        *self.session.borrow()
    }

    async fn read_children(&self, path: &str) -> RegistryResult<Vec<String>> {
        if self.fail_reads.load(Ordering::SeqCst) > 0 {
            self.fail_reads.fetch_sub(1, Ordering::SeqCst);
            return Err(RegistryError::Transport(
                "simulated children read failure".into(),
            ));
        }
        let guard = self.children.lock().expect("memory registry lock poisoned");
        guard
            .get(path)
            .cloned()
            .ok_or_else(|| RegistryError::PathNotFound(path.to_string()))
    }

    async fn watch_children(&self, _path: &str) -> RegistryResult<WatchEvent> {
        let mut version = self.version.subscribe();
        let mut session = self.session.subscribe();

        // Changes made while no watch was installed are not lost: the next
        // installation fires immediately, mirroring the per-session event
        // queue of a real coordination client.
        let current = *version.borrow();
        if current > self.seen_version.load(Ordering::SeqCst) {
            self.seen_version.store(current, Ordering::SeqCst);
            return Ok(WatchEvent::ChildrenChanged);
        }

        tokio::select! {
            changed = version.changed() => {
                changed.map_err(|_| RegistryError::Closed("children channel dropped".into()))?;
                self.seen_version.store(*version.borrow(), Ordering::SeqCst);
                Ok(WatchEvent::ChildrenChanged)
            }
            changed = session.changed() => changed
                .map(|_| WatchEvent::Session(*session.borrow()))
                .map_err(|_| RegistryError::Closed("session channel dropped".into())),
        }
    }
}
