//! NATS JetStream KV registry backend.
//!
//! Wraps `async-nats` to provide the registry capability over a live
//! coordination service. Each registry path maps to one KV bucket; child
//! entries are the stored values, keyed by a sanitized form of the entry
//! text. A one-shot children watch is a fresh KV watch that is consumed for
//! exactly one event and then dropped.
//!
//! Reads and watch events advance a per-path revision cursor, and every
//! watch subscribes from the cursor. A put or delete landing while no watch
//! is installed fires the next installation instead of being lost.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::{Registry, SessionState, WatchEvent};

/// Base delay for retrying initial connections.
const CONNECT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound for retry backoff during initial connect.
const MAX_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// KV history depth. Entries are plain presence markers, one revision is
/// enough.
const ENTRY_KV_HISTORY: i64 = 1;

/// Inner state shared behind Arc<RwLock<…>>.
struct RegistryInner {
    nats_client: Option<async_nats::Client>,
    state: SessionState,
}

/// Registry backend over NATS JetStream KV.
///
/// Provides:
/// - Session bootstrap from [`RegistryConfig`] with bounded retry/backoff
/// - Children reads and one-shot children watches per registry path
/// - `register`/`deregister` helpers for the publishing side
#[derive(Clone)]
pub struct NatsRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    /// Highest KV revision observed per registry path. Watches subscribe
    /// from here so nothing slips through between a read and the next
    /// watch installation.
    revisions: Arc<RwLock<HashMap<String, u64>>>,
    config: RegistryConfig,
}

impl NatsRegistry {
    /// Create a new backend from config, without connecting yet.
    ///
    /// Call [`Registry::connect`] to establish the session.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                nats_client: None,
                state: SessionState::Disconnected,
            })),
            revisions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    async fn recorded_revision(&self, path: &str) -> u64 {
        self.revisions.read().await.get(path).copied().unwrap_or(0)
    }

    /// Advance the revision cursor for `path`. Never moves backwards.
    async fn record_revision(&self, path: &str, revision: u64) {
        let mut revisions = self.revisions.write().await;
        let cursor = revisions.entry(path.to_string()).or_insert(0);
        if revision > *cursor {
            *cursor = revision;
        }
    }

    /// KV bucket name for a registry path. Bucket names reject `/` and `:`,
    /// so those map to `_`.
    fn bucket_name(path: &str) -> String {
        sanitize(path)
    }

    /// KV key for a child entry. Same character restrictions as buckets.
    fn entry_key(entry: &str) -> String {
        sanitize(entry)
    }

    fn build_connect_options(config: &RegistryConfig) -> async_nats::ConnectOptions {
        async_nats::ConnectOptions::new().connection_timeout(config.connect_timeout)
    }

    /// Get a reference to the underlying client, or fail if not connected.
    async fn nats_client(&self) -> RegistryResult<async_nats::Client> {
        let inner = self.inner.read().await;
        inner
            .nats_client
            .clone()
            .ok_or_else(|| RegistryError::NotConnected("registry session not established".into()))
    }

    /// Build a JetStream context for the active connection.
    async fn jetstream_context(&self) -> RegistryResult<jetstream::Context> {
        let client = self.nats_client().await?;
        Ok(jetstream::new(client))
    }

    /// Open the KV bucket backing `path`, failing with `PathNotFound` when
    /// no registrant has created it yet.
    async fn kv_store(&self, path: &str) -> RegistryResult<jetstream::kv::Store> {
        let js = self.jetstream_context().await?;
        let bucket = Self::bucket_name(path);
        match js.get_key_value(bucket.clone()).await {
            Ok(store) => Ok(store),
            Err(err)
                if matches!(
                    err.kind(),
                    jetstream::context::KeyValueErrorKind::GetBucket
                ) =>
            {
                Err(RegistryError::PathNotFound(path.to_string()))
            }
            Err(err) => Err(RegistryError::Transport(format!(
                "failed to open KV bucket '{bucket}': {err}"
            ))),
        }
    }

    /// Open the KV bucket backing `path`, creating it if missing. Only the
    /// publishing side creates buckets; the watcher observes.
    async fn get_or_create_store(&self, path: &str) -> RegistryResult<jetstream::kv::Store> {
        let js = self.jetstream_context().await?;
        let bucket = Self::bucket_name(path);
        match js.get_key_value(bucket.clone()).await {
            Ok(store) => Ok(store),
            Err(get_err) => {
                debug!(bucket, error = %get_err, "creating missing registry KV bucket");
                js.create_key_value(jetstream::kv::Config {
                    bucket: bucket.clone(),
                    history: ENTRY_KV_HISTORY,
                    ..Default::default()
                })
                .await
                .map_err(|create_err| {
                    RegistryError::Transport(format!(
                        "failed to create KV bucket '{bucket}': {create_err} (get error: {get_err})"
                    ))
                })
            }
        }
    }

    /// Publish a `host:port` entry under `path`, standing in for a server
    /// instance coming online.
    pub async fn register(&self, path: &str, entry: &str) -> RegistryResult<()> {
        let store = self.get_or_create_store(path).await?;
        let key = Self::entry_key(entry);
        store
            .put(&key, entry.as_bytes().to_vec().into())
            .await
            .map_err(|e| {
                RegistryError::Transport(format!("KV write failed for key '{key}': {e}"))
            })?;
        info!(path, entry, "registered server entry");
        Ok(())
    }

    /// Remove a previously published entry.
    pub async fn deregister(&self, path: &str, entry: &str) -> RegistryResult<()> {
        let store = self.kv_store(path).await?;
        let key = Self::entry_key(entry);
        store.delete(&key).await.map_err(|e| {
            RegistryError::Transport(format!("KV delete failed for key '{key}': {e}"))
        })?;
        info!(path, entry, "deregistered server entry");
        Ok(())
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl std::fmt::Debug for NatsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsRegistry")
            .field("servers", &self.config.servers)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Registry for NatsRegistry {
    async fn connect(&self) -> RegistryResult<()> {
        {
            let inner = self.inner.read().await;
            if inner.state == SessionState::Connected {
                debug!("registry session already established, skipping connect");
                return Ok(());
            }
        }

        info!(
            servers = ?self.config.servers,
            connect_retry_max = self.config.connect_retry_max,
            "connecting to registry"
        );

        {
            let mut inner = self.inner.write().await;
            inner.nats_client = None;
            inner.state = SessionState::Connecting;
        }

        let total_attempts = self.config.connect_retry_max.saturating_add(1);
        for attempt in 0..total_attempts {
            let opts = Self::build_connect_options(&self.config);
            match opts.connect(self.config.servers.clone()).await {
                Ok(client) => {
                    let mut inner = self.inner.write().await;
                    inner.nats_client = Some(client);
                    inner.state = SessionState::Connected;

                    info!(
                        attempt = attempt + 1,
                        total_attempts, "registry session established"
                    );
                    return Ok(());
                }
                Err(err) => {
                    let attempt_num = attempt + 1;
                    if attempt_num >= total_attempts {
                        error!(
                            attempts = total_attempts,
                            error = %err,
                            "registry connection failed after all retry attempts"
                        );

                        let mut inner = self.inner.write().await;
                        inner.state = SessionState::Disconnected;
                        return Err(RegistryError::Connection(format!(
                            "registry connection failed after {total_attempts} attempt(s): {err}"
                        )));
                    }

                    let delay = CONNECT_RETRY_BASE_DELAY
                        .saturating_mul(2u32.saturating_pow(attempt))
                        .min(MAX_CONNECT_RETRY_DELAY);
                    warn!(
                        attempt = attempt_num,
                        total_attempts,
                        retry_in_ms = delay.as_millis(),
                        error = %err,
                        "registry connection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        unreachable!("connect loop returns on success or terminal failure")
    }

    async fn session_state(&self) -> SessionState {
        let inner = self.inner.read().await;
        // If we have a client, report its live state
        if let Some(ref client) = inner.nats_client {
            match client.connection_state() {
                async_nats::connection::State::Connected => SessionState::Connected,
                async_nats::connection::State::Pending => SessionState::Connecting,
                async_nats::connection::State::Disconnected => SessionState::Disconnected,
            }
        } else {
            inner.state
        }
    }

    async fn read_children(&self, path: &str) -> RegistryResult<Vec<String>> {
        let store = self.kv_store(path).await?;
        let mut children = Vec::new();
        let mut max_revision = 0u64;
        let mut keys = store.keys().await.map_err(|e| {
            RegistryError::Transport(format!("failed to list KV keys for '{path}': {e}"))
        })?;

        while let Some(key) = keys.try_next().await.map_err(|e| {
            RegistryError::Transport(format!("failed reading KV keys for '{path}': {e}"))
        })? {
            match store.entry(key.clone()).await {
                Ok(Some(entry)) => {
                    max_revision = max_revision.max(entry.revision);
                    match String::from_utf8(entry.value.to_vec()) {
                        Ok(child) => children.push(child),
                        Err(_) => warn!(key, "skipping non-utf8 registry entry"),
                    }
                }
                // entry deleted between the key listing and the read
                Ok(None) => {}
                Err(err) => {
                    return Err(RegistryError::Transport(format!(
                        "KV read failed for key '{key}': {err}"
                    )));
                }
            }
        }
        if max_revision > 0 {
            self.record_revision(path, max_revision).await;
        }
        Ok(children)
    }

    async fn watch_children(&self, path: &str) -> RegistryResult<WatchEvent> {
        let store = self.kv_store(path).await?;
        // Subscribe from just past the cursor: mutations made while no watch
        // was installed replay as the first event instead of being dropped.
        let revision = self.recorded_revision(path).await;
        let mut updates = store
            .watch_all_from_revision(revision + 1)
            .await
            .map_err(|e| {
                RegistryError::Transport(format!(
                    "failed to install children watch on '{path}': {e}"
                ))
            })?;

        match updates.next().await {
            Some(Ok(entry)) => {
                self.record_revision(path, entry.revision).await;
                debug!(path, key = entry.key, operation = ?entry.operation, "children watch fired");
                Ok(WatchEvent::ChildrenChanged)
            }
            Some(Err(err)) => {
                let state = self.session_state().await;
                if state == SessionState::Connected {
                    Err(RegistryError::Transport(format!(
                        "children watch on '{path}' failed: {err}"
                    )))
                } else {
                    warn!(path, ?state, error = %err, "children watch interrupted by session change");
                    Ok(WatchEvent::Session(state))
                }
            }
            None => Err(RegistryError::Closed(format!(
                "children watch on '{path}' ended"
            ))),
        }
    }
}
