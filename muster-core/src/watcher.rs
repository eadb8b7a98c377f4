//! Re-arming registry watcher.
//!
//! The coordination service delivers one-shot watches: a fired watch is
//! dead and must be re-installed or every later change becomes invisible.
//! The watcher models that renewal contract as an explicit state machine,
//! `Armed → Fired → Rearming → Armed`, driven by a loop that re-installs
//! the watch on every iteration — including after a failed children read.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use registry_watch::{Registry, WatchEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay before re-arming after a failed watch installation, so a broken
/// backend does not spin the loop hot.
const REARM_BACKOFF: Duration = Duration::from_millis(500);

/// Observable position of the watcher in its renewal cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchState {
    /// Not running.
    Idle = 0,
    /// A one-shot watch is installed and waiting to fire.
    Armed = 1,
    /// The watch fired and the event is being processed.
    Fired = 2,
    /// The event was handled and the watch is about to be re-installed.
    Rearming = 3,
}

impl WatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WatchState::Armed,
            2 => WatchState::Fired,
            3 => WatchState::Rearming,
            _ => WatchState::Idle,
        }
    }
}

/// Holds the registry session and re-arms the children watch indefinitely,
/// feeding raw child-name snapshots to a delivery callback.
pub(crate) struct RegistryWatcher<R> {
    registry: Arc<R>,
    path: String,
    state: AtomicU8,
    cycles: AtomicU64,
}

impl<R: Registry> RegistryWatcher<R> {
    pub(crate) fn new(registry: Arc<R>, path: impl Into<String>) -> Self {
        Self {
            registry,
            path: path.into(),
            state: AtomicU8::new(WatchState::Idle as u8),
            cycles: AtomicU64::new(0),
        }
    }

    /// Current state of the renewal cycle.
    pub(crate) fn state(&self) -> WatchState {
        WatchState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Completed fire-and-rearm cycles since start.
    pub(crate) fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: WatchState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Run the renewal loop until `shutdown` is cancelled.
    ///
    /// Each fired children-changed event triggers a re-read whose snapshot
    /// goes to `deliver`. Session events are logged only. No code path
    /// leaves the loop without re-arming the watch.
    pub(crate) async fn run<F>(&self, shutdown: CancellationToken, mut deliver: F)
    where
        F: FnMut(&[String]) + Send,
    {
        debug!(path = %self.path, "watcher loop started");
        loop {
            self.set_state(WatchState::Armed);
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.registry.watch_children(&self.path) => event,
            };
            self.set_state(WatchState::Fired);

            match event {
                Ok(WatchEvent::ChildrenChanged) => {
                    match self.registry.read_children(&self.path).await {
                        Ok(children) => deliver(&children),
                        Err(err) if err.is_path_not_found() => {
                            info!(path = %self.path, "registry path gone, waiting for it to return");
                        }
                        Err(err) => {
                            warn!(path = %self.path, %err, "children read failed, re-arming watch");
                        }
                    }
                }
                Ok(WatchEvent::Session(state)) => {
                    // a session change is not a membership change; no re-read
                    info!(?state, "registry session state changed");
                }
                Err(err) => {
                    warn!(path = %self.path, %err, "children watch failed, re-arming after backoff");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(REARM_BACKOFF) => {}
                    }
                }
            }

            self.set_state(WatchState::Rearming);
            self.cycles.fetch_add(1, Ordering::SeqCst);
        }
        self.set_state(WatchState::Idle);
        debug!(path = %self.path, "watcher loop stopped");
    }
}

impl<R: Registry> std::fmt::Debug for RegistryWatcher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryWatcher")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("cycles", &self.cycles())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_watch::{MemoryRegistry, SessionState};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    const PATH: &str = "services/hello-world";

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Vec<String>>) -> Vec<String> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no delivery within timeout")
            .expect("delivery channel closed")
    }

    async fn wait_for_cycles<R: Registry>(watcher: &RegistryWatcher<R>, cycles: u64) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while watcher.cycles() < cycles {
            assert!(
                tokio::time::Instant::now() < deadline,
                "watch cycle never completed"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_rearms_for_every_notification() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.set_children(PATH, vec![]);
        registry.connect().await.unwrap();

        let watcher = Arc::new(RegistryWatcher::new(Arc::clone(&registry), PATH));
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let loop_watcher = Arc::clone(&watcher);
        let loop_token = token.clone();
        let task = tokio::spawn(async move {
            loop_watcher
                .run(loop_token, move |children| {
                    tx.send(children.to_vec()).unwrap();
                })
                .await;
        });

        for n in 1..=3u32 {
            registry.add_child(PATH, &format!("10.0.0.{n}:50051"));
            let snapshot = recv(&mut rx).await;
            assert_eq!(snapshot.len(), n as usize);
        }
        wait_for_cycles(&watcher, 3).await;

        token.cancel();
        task.await.unwrap();
        assert_eq!(watcher.state(), WatchState::Idle);
    }

    #[tokio::test]
    async fn test_read_error_does_not_stop_the_watch() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.set_children(PATH, vec![]);
        registry.connect().await.unwrap();

        let watcher = Arc::new(RegistryWatcher::new(Arc::clone(&registry), PATH));
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let loop_watcher = Arc::clone(&watcher);
        let loop_token = token.clone();
        tokio::spawn(async move {
            loop_watcher
                .run(loop_token, move |children| {
                    tx.send(children.to_vec()).unwrap();
                })
                .await;
        });

        // first notification hits a failing read; the watch must survive it
        registry.fail_next_reads(1);
        registry.add_child(PATH, "10.0.0.1:50051");
        wait_for_cycles(&watcher, 1).await;

        registry.add_child(PATH, "10.0.0.2:50051");
        let snapshot = recv(&mut rx).await;
        assert_eq!(snapshot.len(), 2);
        token.cancel();
    }

    #[tokio::test]
    async fn test_session_event_triggers_no_delivery() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.set_children(PATH, vec!["10.0.0.1:50051".into()]);
        registry.connect().await.unwrap();

        let watcher = Arc::new(RegistryWatcher::new(Arc::clone(&registry), PATH));
        let token = CancellationToken::new();
        let deliveries = Arc::new(Mutex::new(Vec::new()));

        let loop_watcher = Arc::clone(&watcher);
        let loop_token = token.clone();
        let sink = Arc::clone(&deliveries);
        tokio::spawn(async move {
            loop_watcher
                .run(loop_token, move |children| {
                    sink.lock().unwrap().push(children.to_vec());
                })
                .await;
        });

        registry.set_session_state(SessionState::Expired);
        // give the loop a chance to process the session event
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(deliveries.lock().unwrap().is_empty());
        token.cancel();
    }
}
