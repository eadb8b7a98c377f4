//! End-to-end resolver behavior against the in-process registry backend.

use std::sync::Arc;
use std::time::Duration;

use muster_core::registry_watch::{MemoryRegistry, SessionState};
use muster_core::{
    AddressListener, NameResolver, REGISTRY_PATH, ResolveError, ResolverAttributes, ServerAddr,
    Target,
};
use tokio::sync::mpsc;
use tracing_test::traced_test;

/// Listener that records every delivered address set.
struct Recorder {
    tx: mpsc::UnboundedSender<Vec<ServerAddr>>,
}

impl Recorder {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<ServerAddr>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl AddressListener for Recorder {
    fn on_addresses(&self, addresses: Vec<ServerAddr>, _attributes: ResolverAttributes) {
        self.tx.send(addresses).unwrap();
    }
}

fn target() -> Target {
    "muster://registry.internal:4222".parse().unwrap()
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Vec<ServerAddr>>) -> Vec<ServerAddr> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no delivery within timeout")
        .expect("delivery channel closed")
}

async fn wait_for_cycles(resolver: &NameResolver<MemoryRegistry>, cycles: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while resolver.watch_cycles() < cycles {
        assert!(
            tokio::time::Instant::now() < deadline,
            "watch cycle never completed"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_initial_resolution_delivers_current_population() {
    let registry = MemoryRegistry::new();
    registry.set_children(
        REGISTRY_PATH,
        vec!["10.0.0.1:50051".into(), "10.0.0.2:50051".into()],
    );

    let resolver = NameResolver::new(target(), registry);
    let (listener, mut rx) = Recorder::new();
    resolver.start(listener).await.unwrap();

    let addrs = recv(&mut rx).await;
    assert_eq!(
        addrs,
        vec![
            ServerAddr::new("10.0.0.1", 50051),
            ServerAddr::new("10.0.0.2", 50051),
        ]
    );
    assert_eq!(resolver.last_addresses(), Some(addrs));
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_membership_change_is_a_full_replacement() {
    let registry = MemoryRegistry::new();
    registry.set_children(
        REGISTRY_PATH,
        vec!["10.0.0.1:50051".into(), "10.0.0.2:50051".into()],
    );

    let resolver = NameResolver::new(target(), registry.clone());
    let (listener, mut rx) = Recorder::new();
    resolver.start(listener).await.unwrap();
    assert_eq!(recv(&mut rx).await.len(), 2);

    registry.remove_child(REGISTRY_PATH, "10.0.0.1:50051");
    let addrs = recv(&mut rx).await;
    assert_eq!(addrs, vec![ServerAddr::new("10.0.0.2", 50051)]);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_empty_population_retains_last_known_good() {
    let registry = MemoryRegistry::new();
    registry.set_children(
        REGISTRY_PATH,
        vec!["10.0.0.1:50051".into(), "10.0.0.2:50051".into()],
    );

    let resolver = NameResolver::new(target(), registry.clone());
    let (listener, mut rx) = Recorder::new();
    resolver.start(listener).await.unwrap();
    let initial = recv(&mut rx).await;
    assert_eq!(initial.len(), 2);

    // all servers go away; the listener must not hear about it
    let cycles = resolver.watch_cycles();
    registry.set_children(REGISTRY_PATH, vec![]);
    wait_for_cycles(&resolver, cycles + 1).await;

    assert!(rx.try_recv().is_err(), "empty set must not be delivered");
    assert_eq!(resolver.last_addresses(), Some(initial));

    // a server comes back and resolution resumes
    registry.add_child(REGISTRY_PATH, "10.0.0.3:50051");
    let addrs = recv(&mut rx).await;
    assert_eq!(addrs, vec![ServerAddr::new("10.0.0.3", 50051)]);
    resolver.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn test_empty_population_is_logged() {
    let registry = MemoryRegistry::new();
    registry.set_children(REGISTRY_PATH, vec!["10.0.0.1:50051".into()]);

    let resolver = NameResolver::new(target(), registry.clone());
    let (listener, mut rx) = Recorder::new();
    resolver.start(listener).await.unwrap();
    recv(&mut rx).await;

    let cycles = resolver.watch_cycles();
    registry.set_children(REGISTRY_PATH, vec![]);
    wait_for_cycles(&resolver, cycles + 1).await;

    assert!(logs_contain("no servers online"));
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_malformed_entries_are_skipped_not_fatal() {
    let registry = MemoryRegistry::new();
    registry.set_children(
        REGISTRY_PATH,
        vec!["garbage".into(), "10.0.0.1:50051".into(), ":9090".into()],
    );

    let resolver = NameResolver::new(target(), registry);
    let (listener, mut rx) = Recorder::new();
    resolver.start(listener).await.unwrap();

    let addrs = recv(&mut rx).await;
    assert_eq!(addrs, vec![ServerAddr::new("10.0.0.1", 50051)]);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_watch_rearms_across_many_changes() {
    let registry = MemoryRegistry::new();
    registry.set_children(REGISTRY_PATH, vec!["10.0.0.1:50051".into()]);

    let resolver = NameResolver::new(target(), registry.clone());
    let (listener, mut rx) = Recorder::new();
    resolver.start(listener).await.unwrap();
    assert_eq!(recv(&mut rx).await.len(), 1);

    for n in 2..=5u32 {
        registry.add_child(REGISTRY_PATH, &format!("10.0.0.{n}:50051"));
        let addrs = recv(&mut rx).await;
        assert_eq!(addrs.len(), n as usize);
    }
    wait_for_cycles(&resolver, 4).await;
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let registry = MemoryRegistry::new();
    registry.set_children(REGISTRY_PATH, vec!["10.0.0.1:50051".into()]);

    let resolver = NameResolver::new(target(), registry);
    let (listener, _rx) = Recorder::new();
    resolver.start(Arc::clone(&listener) as _).await.unwrap();

    let again = resolver.start(listener).await;
    assert!(matches!(again, Err(ResolveError::AlreadyStarted)));
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_refused_connection_fails_start() {
    let registry = MemoryRegistry::new();
    registry.refuse_connections();

    let resolver = NameResolver::new(target(), registry);
    let (listener, _rx) = Recorder::new();
    let result = resolver.start(listener).await;
    assert!(matches!(result, Err(ResolveError::Connection(_))));
}

#[tokio::test]
async fn test_connect_timeout_fails_start() {
    let registry = MemoryRegistry::new();
    registry.stall_connections();

    let resolver =
        NameResolver::new(target(), registry).with_session_timeout(Duration::from_millis(50));
    let (listener, _rx) = Recorder::new();
    let result = resolver.start(listener).await;
    assert!(matches!(result, Err(ResolveError::ConnectTimeout(_))));
}

#[tokio::test]
async fn test_missing_path_is_not_a_start_error() {
    let registry = MemoryRegistry::new();

    let resolver = NameResolver::new(target(), registry.clone());
    let (listener, mut rx) = Recorder::new();
    resolver.start(listener).await.unwrap();
    assert_eq!(resolver.last_addresses(), None);

    // the path appears later and resolution picks it up
    registry.set_children(REGISTRY_PATH, vec!["10.0.0.1:50051".into()]);
    let addrs = recv(&mut rx).await;
    assert_eq!(addrs, vec![ServerAddr::new("10.0.0.1", 50051)]);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_authority_is_pure() {
    let registry = MemoryRegistry::new();
    let resolver = NameResolver::new(target(), registry);
    // callable before start, no session required
    assert_eq!(resolver.authority(), "registry.internal:4222");
    assert_eq!(resolver.target().scheme(), "muster");
}

#[tokio::test]
async fn test_session_event_does_not_disturb_addresses() {
    let registry = MemoryRegistry::new();
    registry.set_children(REGISTRY_PATH, vec!["10.0.0.1:50051".into()]);

    let resolver = NameResolver::new(target(), registry.clone());
    let (listener, mut rx) = Recorder::new();
    resolver.start(listener).await.unwrap();
    let initial = recv(&mut rx).await;

    let cycles = resolver.watch_cycles();
    registry.set_session_state(SessionState::Disconnected);
    wait_for_cycles(&resolver, cycles + 1).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(resolver.last_addresses(), Some(initial));
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_delivery() {
    let registry = MemoryRegistry::new();
    registry.set_children(REGISTRY_PATH, vec!["10.0.0.1:50051".into()]);

    let resolver = NameResolver::new(target(), registry.clone());
    let (listener, mut rx) = Recorder::new();
    resolver.start(listener).await.unwrap();
    recv(&mut rx).await;

    resolver.shutdown().await;
    registry.add_child(REGISTRY_PATH, "10.0.0.2:50051");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}
