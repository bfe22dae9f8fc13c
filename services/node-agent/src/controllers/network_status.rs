//! Network readiness aggregation.
//!
//! Folds address, connectivity, hostname, and /etc file facts into the
//! singleton readiness summary. Every fact is recomputed from scratch
//! each cycle and the summary is committed with full-replace
//! semantics, so a fact whose source disappeared never leaks forward
//! from a previous cycle.

use async_trait::async_trait;

use nodeos_resources::{
    id, kind, namespace, NetworkStatusSpec, Payload, RouteStatusSpec, Store,
};

use crate::controller::{Controller, ControllerContext, ControllerError, Input, Output};

/// Files that must be rendered under /etc before the node counts as
/// file-ready, checked in order with early exit.
const REQUIRED_ETC_FILES: &[&str] = &["hosts", "resolv.conf"];

/// Aggregates network facts into the readiness summary.
pub struct NetworkStatusController;

#[async_trait]
impl Controller for NetworkStatusController {
    fn name(&self) -> &'static str {
        "network.StatusController"
    }

    fn inputs(&self) -> Vec<Input> {
        vec![
            Input::weak_id(
                namespace::NETWORK,
                kind::NODE_ADDRESS,
                id::NODE_ADDRESS_CURRENT,
            ),
            Input::weak(namespace::NETWORK, kind::ROUTE_STATUS),
            Input::weak(namespace::NETWORK, kind::HOSTNAME_STATUS),
            Input::weak(namespace::FILES, kind::ETC_FILE_STATUS),
            Input::weak(namespace::NETWORK, kind::PROBE_STATUS),
        ]
    }

    fn outputs(&self) -> Vec<Output> {
        vec![Output::exclusive(kind::NETWORK_STATUS)]
    }

    async fn run(&mut self, ctx: &mut ControllerContext) -> Result<(), ControllerError> {
        while ctx.next_event().await {
            let result = derive_status(ctx.store()).await?;

            ctx.store()
                .modify(
                    namespace::NETWORK,
                    kind::NETWORK_STATUS,
                    id::NETWORK_STATUS,
                    Payload::NetworkStatus(NetworkStatusSpec::default()),
                    Box::new(move |payload| *payload = Payload::NetworkStatus(result)),
                )
                .await?;

            ctx.reset_restart_backoff();
        }

        Ok(())
    }
}

/// Recompute the readiness summary from the current graph.
async fn derive_status(store: &dyn Store) -> Result<NetworkStatusSpec, ControllerError> {
    let mut status = NetworkStatusSpec::default();

    // addresses
    match store
        .get(
            namespace::NETWORK,
            kind::NODE_ADDRESS,
            id::NODE_ADDRESS_CURRENT,
        )
        .await
    {
        Ok(resource) => {
            if let Some(spec) = resource.payload.as_node_address() {
                status.address_ready = !spec.addresses.is_empty();
            }
        }
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err.into()),
    }

    // connectivity
    // if any probes are configured they are authoritative; otherwise
    // rely on presence of a default route
    let probes = store
        .list(namespace::NETWORK, kind::PROBE_STATUS, "")
        .await?;

    if !probes.is_empty() {
        status.connectivity_ready = probes.iter().all(|resource| {
            resource
                .payload
                .as_probe_status()
                .map(|probe| probe.success)
                .unwrap_or(false)
        });
    } else {
        let routes = store
            .list(namespace::NETWORK, kind::ROUTE_STATUS, "")
            .await?;

        status.connectivity_ready = routes.iter().any(|resource| {
            resource
                .payload
                .as_route_status()
                .map(RouteStatusSpec::is_default)
                .unwrap_or(false)
        });
    }

    // hostname: existence is what matters, content is not
    match store
        .get(namespace::NETWORK, kind::HOSTNAME_STATUS, id::HOSTNAME)
        .await
    {
        Ok(_) => status.hostname_ready = true,
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err.into()),
    }

    // etc files
    status.etc_files_ready = true;

    for required in REQUIRED_ETC_FILES {
        match store
            .get(namespace::FILES, kind::ETC_FILE_STATUS, required)
            .await
        {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                status.etc_files_ready = false;
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use nodeos_resources::{
        EtcFileStatusSpec, HostnameStatusSpec, MemoryStore, NodeAddressSpec, ProbeStatusSpec,
    };

    use super::*;

    async fn put(store: &MemoryStore, ns: &str, resource_kind: &str, id: &str, payload: Payload) {
        let replacement = payload.clone();
        store
            .modify(
                ns,
                resource_kind,
                id,
                payload,
                Box::new(move |p| *p = replacement),
            )
            .await
            .unwrap();
    }

    async fn put_addresses(store: &MemoryStore, addresses: &[&str]) {
        put(
            store,
            namespace::NETWORK,
            kind::NODE_ADDRESS,
            id::NODE_ADDRESS_CURRENT,
            Payload::NodeAddress(NodeAddressSpec {
                addresses: addresses.iter().map(|a| a.to_string()).collect(),
            }),
        )
        .await;
    }

    async fn put_probe(store: &MemoryStore, probe_id: &str, success: bool) {
        put(
            store,
            namespace::NETWORK,
            kind::PROBE_STATUS,
            probe_id,
            Payload::ProbeStatus(ProbeStatusSpec { success }),
        )
        .await;
    }

    async fn put_route(store: &MemoryStore, route_id: &str, destination: Option<&str>) {
        put(
            store,
            namespace::NETWORK,
            kind::ROUTE_STATUS,
            route_id,
            Payload::RouteStatus(RouteStatusSpec {
                destination: destination.map(|d| d.to_string()),
            }),
        )
        .await;
    }

    async fn put_etc_file(store: &MemoryStore, name: &str) {
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

    #[tokio::test]
    async fn test_empty_graph_is_all_unready() {
        let store = MemoryStore::new();
        let status = derive_status(&store).await.unwrap();
        assert_eq!(status, NetworkStatusSpec::default());
    }

    #[tokio::test]
    async fn test_address_ready_requires_nonempty_list() {
        let store = MemoryStore::new();

        put_addresses(&store, &[]).await;
        assert!(!derive_status(&store).await.unwrap().address_ready);

        put_addresses(&store, &["10.0.0.5/24"]).await;
        assert!(derive_status(&store).await.unwrap().address_ready);
    }

    #[tokio::test]
    async fn test_connectivity_all_probes_must_succeed() {
        let store = MemoryStore::new();

        put_probe(&store, "gateway", true).await;
        assert!(derive_status(&store).await.unwrap().connectivity_ready);

        // One failing probe flips readiness regardless of routes.
        put_probe(&store, "external", false).await;
        put_route(&store, "default", None).await;
        assert!(!derive_status(&store).await.unwrap().connectivity_ready);
    }

    #[tokio::test]
    async fn test_connectivity_route_fallback_without_probes() {
        let store = MemoryStore::new();

        // A route with a concrete destination is not a default route.
        put_route(&store, "lan", Some("192.168.0.0/16")).await;
        assert!(!derive_status(&store).await.unwrap().connectivity_ready);

        put_route(&store, "default", None).await;
        assert!(derive_status(&store).await.unwrap().connectivity_ready);
    }

    #[tokio::test]
    async fn test_hostname_ready_on_existence() {
        let store = MemoryStore::new();
        assert!(!derive_status(&store).await.unwrap().hostname_ready);

        put(
            &store,
            namespace::NETWORK,
            kind::HOSTNAME_STATUS,
            id::HOSTNAME,
            Payload::HostnameStatus(HostnameStatusSpec {
                hostname: "node-1".to_string(),
            }),
        )
        .await;
        assert!(derive_status(&store).await.unwrap().hostname_ready);
    }

    #[tokio::test]
    async fn test_etc_files_ready_requires_both_files() {
        let store = MemoryStore::new();

        put_etc_file(&store, "hosts").await;
        assert!(!derive_status(&store).await.unwrap().etc_files_ready);

        put_etc_file(&store, "resolv.conf").await;
        assert!(derive_status(&store).await.unwrap().etc_files_ready);

        store
            .remove(namespace::FILES, kind::ETC_FILE_STATUS, "hosts")
            .await
            .unwrap();
        assert!(!derive_status(&store).await.unwrap().etc_files_ready);
    }
}
