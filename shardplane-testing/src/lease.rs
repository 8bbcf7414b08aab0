//! In-memory keyed-lease election backend.
//!
//! A first-come-wins lease per key: campaigning means locking the key's
//! lease, leadership is holding the lock, and cancellation releases it so
//! the next campaigner in line wins. Useful for exercising real contention
//! and failover between two managers without a consensus store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use shardplane_core::{
    ElectionError, ElectionResult, Elector, ElectorFactory, LeadershipEvents, NamespaceConfig,
};

/// Shared lease registry. Each key holds at most one leader at a time.
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    leases: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    holders: DashMap<String, Uuid>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The node currently holding the lease for `key`, if any.
    pub fn holder(&self, key: &str) -> Option<Uuid> {
        self.holders.get(key).map(|entry| *entry.value())
    }

    /// A factory representing one campaigning process.
    pub fn factory(self: &Arc<Self>) -> Arc<LeaseElectorFactory> {
        Arc::new(LeaseElectorFactory {
            store: Arc::clone(self),
            node_id: Uuid::new_v4(),
        })
    }

    fn lease(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.leases
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}

/// Elector factory bound to one simulated process identity.
pub struct LeaseElectorFactory {
    store: Arc<InMemoryLeaseStore>,
    node_id: Uuid,
}

impl LeaseElectorFactory {
    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    /// This store keeps a lease alive by renewing it within its TTL, so the
    /// TTL must be non-zero and the heartbeat must fit inside it.
    fn check_lease_params(namespace: &NamespaceConfig) -> ElectionResult<()> {
        if namespace.lease_ttl.is_zero() {
            return Err(ElectionError::config(format!(
                "namespace {}: lease ttl must be non-zero",
                namespace.name
            )));
        }
        if namespace.heartbeat_interval >= namespace.lease_ttl {
            return Err(ElectionError::config(format!(
                "namespace {}: heartbeat interval must be shorter than lease ttl",
                namespace.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ElectorFactory for LeaseElectorFactory {
    async fn create_elector(
        &self,
        namespace: &NamespaceConfig,
    ) -> ElectionResult<Box<dyn Elector>> {
        namespace.validate()?;
        Self::check_lease_params(namespace)?;
        Ok(Box::new(LeaseElector {
            store: Arc::clone(&self.store),
            key: namespace.lease_key(),
            node_id: self.node_id,
        }))
    }

    fn validate(&self, namespace: &NamespaceConfig) -> ElectionResult<()> {
        namespace.validate()?;
        Self::check_lease_params(namespace)
    }
}

struct LeaseElector {
    store: Arc<InMemoryLeaseStore>,
    key: String,
    node_id: Uuid,
}

impl Elector for LeaseElector {
    fn run(self: Box<Self>, cancel: CancellationToken) -> LeadershipEvents {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let lease = self.store.lease(&self.key);

            let guard = tokio::select! {
                biased;
                // Resigned before ever winning; no event was emitted.
                _ = cancel.cancelled() => return,
                guard = lease.lock_owned() => guard,
            };

            debug!("Node {} acquired lease {}", self.node_id, self.key);
            self.store.holders.insert(self.key.clone(), self.node_id);

            if tx.send(true).await.is_ok() {
                cancel.cancelled().await;
            }

            self.store.holders.remove(&self.key);
            debug!("Node {} released lease {}", self.node_id, self.key);
            drop(guard);
            // tx drops here, closing the stream after the lease is released.
        });
        rx
    }
}
