//! Store interface and the in-memory reference engine.
//!
//! Controllers consume the `Store` trait only; the engine behind it is
//! interchangeable. `MemoryStore` keeps everything in a `BTreeMap`
//! behind a `tokio::sync::RwLock` and fans change notifications out to
//! subscribers through capacity-1 channels, so bursts of commits
//! coalesce into a single wake.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::error::StoreError;
use crate::types::{Payload, Resource, Selector};

/// Boxed transform applied under `modify`.
pub type Transform = Box<dyn FnOnce(&mut Payload) + Send>;

/// Narrow store interface consumed by controllers.
#[async_trait]
pub trait Store: Send + Sync {
    /// Point read.
    async fn get(&self, namespace: &str, kind: &str, id: &str) -> Result<Resource, StoreError>;

    /// Prefix listing; returns a finite snapshot, restartable by
    /// calling again.
    async fn list(
        &self,
        namespace: &str,
        kind: &str,
        id_prefix: &str,
    ) -> Result<Vec<Resource>, StoreError>;

    /// Read-modify-write. Creates the provided zero value if the
    /// resource is absent, applies the transform, and commits with a
    /// bumped version.
    async fn modify(
        &self,
        namespace: &str,
        kind: &str,
        id: &str,
        default: Payload,
        transform: Transform,
    ) -> Result<(), StoreError>;

    /// Remove a resource. Returns `NotFound` if it does not exist.
    async fn remove(&self, namespace: &str, kind: &str, id: &str) -> Result<(), StoreError>;

    /// Subscribe to coalesced change notifications for the given
    /// selectors.
    async fn subscribe(&self, selectors: Vec<Selector>) -> mpsc::Receiver<()>;
}

type Key = (String, String, String);

struct Entry {
    version: u64,
    payload: Payload,
}

struct Watcher {
    selectors: Vec<Selector>,
    tx: mpsc::Sender<()>,
}

struct Inner {
    entries: BTreeMap<Key, Entry>,
    watchers: Vec<Watcher>,
}

/// In-memory versioned resource store.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: BTreeMap::new(),
                watchers: Vec::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Wake every subscriber whose selectors match the committed
    /// resource. A full channel means a wake is already pending, which
    /// is exactly the coalescing contract. Closed receivers are pruned.
    fn notify(&mut self, namespace: &str, kind: &str, id: &str) {
        self.watchers.retain(|watcher| {
            if !watcher
                .selectors
                .iter()
                .any(|s| s.matches(namespace, kind, id))
            {
                return !watcher.tx.is_closed();
            }

            match watcher.tx.try_send(()) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
                Err(mpsc::error::TrySendError::Closed(())) => false,
            }
        });
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, namespace: &str, kind: &str, id: &str) -> Result<Resource, StoreError> {
        let inner = self.inner.read().await;
        let key = (namespace.to_string(), kind.to_string(), id.to_string());

        let entry = inner
            .entries
            .get(&key)
            .ok_or_else(|| StoreError::not_found(namespace, kind, id))?;

        Ok(Resource {
            namespace: namespace.to_string(),
            kind: kind.to_string(),
            id: id.to_string(),
            version: entry.version,
            payload: entry.payload.clone(),
        })
    }

    async fn list(
        &self,
        namespace: &str,
        kind: &str,
        id_prefix: &str,
    ) -> Result<Vec<Resource>, StoreError> {
        let inner = self.inner.read().await;

        Ok(inner
            .entries
            .iter()
            .filter(|((ns, k, id), _)| ns == namespace && k == kind && id.starts_with(id_prefix))
            .map(|((ns, k, id), entry)| Resource {
                namespace: ns.clone(),
                kind: k.clone(),
                id: id.clone(),
                version: entry.version,
                payload: entry.payload.clone(),
            })
            .collect())
    }

    async fn modify(
        &self,
        namespace: &str,
        kind: &str,
        id: &str,
        default: Payload,
        transform: Transform,
    ) -> Result<(), StoreError> {
        if default.kind() != kind {
            return Err(StoreError::KindMismatch {
                expected: kind.to_string(),
                actual: default.kind().to_string(),
            });
        }

        let mut inner = self.inner.write().await;
        let key = (namespace.to_string(), kind.to_string(), id.to_string());

        let (mut payload, current_version) = match inner.entries.get(&key) {
            Some(entry) => (entry.payload.clone(), entry.version),
            None => (default, 0),
        };

        transform(&mut payload);

        // A transform must never change the payload kind; nothing is
        // committed if it does.
        if payload.kind() != kind {
            return Err(StoreError::KindMismatch {
                expected: kind.to_string(),
                actual: payload.kind().to_string(),
            });
        }

        let version = current_version + 1;
        inner.entries.insert(key, Entry { version, payload });

        inner.notify(namespace, kind, id);

        debug!(
            namespace = %namespace,
            kind = %kind,
            id = %id,
            version,
            "Committed resource"
        );

        Ok(())
    }

    async fn remove(&self, namespace: &str, kind: &str, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let key = (namespace.to_string(), kind.to_string(), id.to_string());

        if inner.entries.remove(&key).is_none() {
            return Err(StoreError::not_found(namespace, kind, id));
        }

        inner.notify(namespace, kind, id);

        debug!(namespace = %namespace, kind = %kind, id = %id, "Removed resource");

        Ok(())
    }

    async fn subscribe(&self, selectors: Vec<Selector>) -> mpsc::Receiver<()> {
        // Capacity 1: a pending wake absorbs any number of further
        // commits until the subscriber drains it.
        let (tx, rx) = mpsc::channel(1);

        // A fresh subscription starts with one pending wake so the
        // subscriber reconciles against the current graph before any
        // input changes.
        let _ = tx.try_send(());

        let mut inner = self.inner.write().await;
        inner.watchers.push(Watcher { selectors, tx });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{id, kind, namespace, NetworkStatusSpec, ProbeStatusSpec};

    fn probe(success: bool) -> Payload {
        Payload::ProbeStatus(ProbeStatusSpec { success })
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let store = MemoryStore::new();

        let err = store
            .get(namespace::NETWORK, kind::PROBE_STATUS, "gateway")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_modify_creates_zero_value_and_bumps_version() {
        let store = MemoryStore::new();

        store
            .modify(
                namespace::NETWORK,
                kind::PROBE_STATUS,
                "gateway",
                probe(false),
                Box::new(|_| {}),
            )
            .await
            .unwrap();

        let res = store
            .get(namespace::NETWORK, kind::PROBE_STATUS, "gateway")
            .await
            .unwrap();
        assert_eq!(res.version, 1);
        assert!(!res.payload.as_probe_status().unwrap().success);

        store
            .modify(
                namespace::NETWORK,
                kind::PROBE_STATUS,
                "gateway",
                probe(false),
                Box::new(|p| {
                    if let Payload::ProbeStatus(spec) = p {
                        spec.success = true;
                    }
                }),
            )
            .await
            .unwrap();

        let res = store
            .get(namespace::NETWORK, kind::PROBE_STATUS, "gateway")
            .await
            .unwrap();
        assert_eq!(res.version, 2);
        assert!(res.payload.as_probe_status().unwrap().success);
    }

    #[tokio::test]
    async fn test_modify_rejects_kind_mismatch() {
        let store = MemoryStore::new();

        let err = store
            .modify(
                namespace::NETWORK,
                kind::NETWORK_STATUS,
                id::NETWORK_STATUS,
                probe(false),
                Box::new(|_| {}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::KindMismatch { .. }));
    }

    #[tokio::test]
    async fn test_list_prefix_snapshot() {
        let store = MemoryStore::new();

        for probe_id in ["gateway", "dns", "external"] {
            store
                .modify(
                    namespace::NETWORK,
                    kind::PROBE_STATUS,
                    probe_id,
                    probe(true),
                    Box::new(|_| {}),
                )
                .await
                .unwrap();
        }

        let all = store
            .list(namespace::NETWORK, kind::PROBE_STATUS, "")
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let filtered = store
            .list(namespace::NETWORK, kind::PROBE_STATUS, "g")
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "gateway");
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::new();

        store
            .modify(
                namespace::NETWORK,
                kind::PROBE_STATUS,
                "gateway",
                probe(true),
                Box::new(|_| {}),
            )
            .await
            .unwrap();

        store
            .remove(namespace::NETWORK, kind::PROBE_STATUS, "gateway")
            .await
            .unwrap();

        let err = store
            .remove(namespace::NETWORK, kind::PROBE_STATUS, "gateway")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_subscribe_coalesces_commits() {
        let store = MemoryStore::new();

        let mut rx = store
            .subscribe(vec![Selector::kind(namespace::NETWORK, kind::PROBE_STATUS)])
            .await;

        // Drain the initial wake every subscription starts with.
        rx.recv().await.unwrap();

        // Burst of commits while nobody is draining the channel.
        for probe_id in ["a", "b", "c"] {
            store
                .modify(
                    namespace::NETWORK,
                    kind::PROBE_STATUS,
                    probe_id,
                    probe(true),
                    Box::new(|_| {}),
                )
                .await
                .unwrap();
        }

        // Exactly one wake is pending.
        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_filters_by_selector() {
        let store = MemoryStore::new();

        let mut rx = store
            .subscribe(vec![Selector::id(
                namespace::NETWORK,
                kind::NETWORK_STATUS,
                id::NETWORK_STATUS,
            )])
            .await;

        // Drain the initial wake every subscription starts with.
        rx.recv().await.unwrap();

        // Non-matching commit: no wake.
        store
            .modify(
                namespace::NETWORK,
                kind::PROBE_STATUS,
                "gateway",
                probe(true),
                Box::new(|_| {}),
            )
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());

        // Matching commit: wake.
        store
            .modify(
                namespace::NETWORK,
                kind::NETWORK_STATUS,
                id::NETWORK_STATUS,
                Payload::NetworkStatus(NetworkStatusSpec::default()),
                Box::new(|_| {}),
            )
            .await
            .unwrap();
        rx.recv().await.unwrap();
    }
}
