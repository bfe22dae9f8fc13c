//! Integration tests for network readiness aggregation.
//!
//! These tests drive the status controller through the registry the
//! way the agent binary does: facts are committed to a shared store
//! and the aggregated summary is polled until it converges.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use nodeos_node_agent::controllers::NetworkStatusController;
use nodeos_node_agent::ControllerRegistry;
use nodeos_resources::{
    id, kind, namespace, EtcFileStatusSpec, HostnameStatusSpec, MemoryStore, NetworkStatusSpec,
    NodeAddressSpec, Payload, ProbeStatusSpec, RouteStatusSpec, Store,
};

fn start(store: Arc<MemoryStore>) -> (watch::Sender<bool>, Vec<JoinHandle<()>>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut registry = ControllerRegistry::new(store);
    registry
        .register(Box::new(NetworkStatusController))
        .unwrap();

    let handles = registry.run(shutdown_rx);
    (shutdown_tx, handles)
}

async fn put(store: &MemoryStore, namespace: &str, kind: &str, id: &str, payload: Payload) {
    let default = payload.clone();
    store
        .modify(namespace, kind, id, default, Box::new(move |p| *p = payload))
        .await
        .unwrap();
}

async fn wait_for_status<F>(store: &MemoryStore, predicate: F) -> NetworkStatusSpec
where
    F: Fn(&NetworkStatusSpec) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);

    loop {
        if let Ok(resource) = store
            .get(namespace::NETWORK, kind::NETWORK_STATUS, id::NETWORK_STATUS)
            .await
        {
            if let Some(status) = resource.payload.as_network_status() {
                if predicate(status) {
                    return *status;
                }
            }
        }

        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for network status to converge"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn seed_full_readiness(store: &MemoryStore) {
    put(
        store,
        namespace::NETWORK,
        kind::NODE_ADDRESS,
        id::NODE_ADDRESS_CURRENT,
        Payload::NodeAddress(NodeAddressSpec {
            addresses: vec!["10.0.0.2/24".to_string()],
        }),
    )
    .await;

    put(
        store,
        namespace::NETWORK,
        kind::PROBE_STATUS,
        "tcp:example.com:443",
        Payload::ProbeStatus(ProbeStatusSpec { success: true }),
    )
    .await;

    put(
        store,
        namespace::NETWORK,
        kind::HOSTNAME_STATUS,
        id::HOSTNAME,
        Payload::HostnameStatus(HostnameStatusSpec {
            hostname: "node-1".to_string(),
        }),
    )
    .await;

    for name in ["hosts", "resolv.conf"] {
        put(
            store,
            namespace::FILES,
            kind::ETC_FILE_STATUS,
            name,
            Payload::EtcFileStatus(EtcFileStatusSpec {
                path: format!("/etc/{name}"),
            }),
        )
        .await;
    }
}

#[tokio::test]
async fn test_status_starts_not_ready() {
    let store = Arc::new(MemoryStore::new());
    let (shutdown_tx, handles) = start(store.clone());

    // No facts at all: the summary still materializes, all false.
    let status = wait_for_status(&store, |_| true).await;
    assert_eq!(status, NetworkStatusSpec::default());

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_status_converges_to_fully_ready() {
    let store = Arc::new(MemoryStore::new());
    seed_full_readiness(&store).await;

    let (shutdown_tx, handles) = start(store.clone());

    let status = wait_for_status(&store, |s| {
        s.address_ready && s.connectivity_ready && s.hostname_ready && s.etc_files_ready
    })
    .await;
    assert_eq!(
        status,
        NetworkStatusSpec {
            address_ready: true,
            connectivity_ready: true,
            hostname_ready: true,
            etc_files_ready: true,
        }
    );

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_probes_are_authoritative_over_routes() {
    let store = Arc::new(MemoryStore::new());
    seed_full_readiness(&store).await;
    put(
        &store,
        namespace::NETWORK,
        kind::ROUTE_STATUS,
        "inet4/default",
        Payload::RouteStatus(RouteStatusSpec { destination: None }),
    )
    .await;

    let (shutdown_tx, handles) = start(store.clone());
    wait_for_status(&store, |s| s.connectivity_ready).await;

    // A failing probe flips connectivity even with a default route.
    put(
        &store,
        namespace::NETWORK,
        kind::PROBE_STATUS,
        "tcp:example.com:443",
        Payload::ProbeStatus(ProbeStatusSpec { success: false }),
    )
    .await;
    wait_for_status(&store, |s| !s.connectivity_ready).await;

    // With the probe gone, the default route carries readiness again.
    store
        .remove(
            namespace::NETWORK,
            kind::PROBE_STATUS,
            "tcp:example.com:443",
        )
        .await
        .unwrap();
    let status = wait_for_status(&store, |s| s.connectivity_ready).await;
    assert!(status.address_ready);

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_fact_disappearance_clears_readiness() {
    let store = Arc::new(MemoryStore::new());
    seed_full_readiness(&store).await;

    let (shutdown_tx, handles) = start(store.clone());
    wait_for_status(&store, |s| s.hostname_ready).await;

    store
        .remove(namespace::NETWORK, kind::HOSTNAME_STATUS, id::HOSTNAME)
        .await
        .unwrap();

    let status = wait_for_status(&store, |s| !s.hostname_ready).await;
    assert!(status.address_ready);
    assert!(status.etc_files_ready);

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_empty_address_list_is_not_ready() {
    let store = Arc::new(MemoryStore::new());
    put(
        &store,
        namespace::NETWORK,
        kind::NODE_ADDRESS,
        id::NODE_ADDRESS_CURRENT,
        Payload::NodeAddress(NodeAddressSpec { addresses: vec![] }),
    )
    .await;

    let (shutdown_tx, handles) = start(store.clone());

    let status = wait_for_status(&store, |_| true).await;
    assert!(!status.address_ready);

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}
