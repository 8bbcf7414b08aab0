//! Namespace manager lifecycle supervisor.
//!
//! Creates exactly one handler task per configured namespace, owns the root
//! cancellation token for all of them, and provides a `stop` that joins every
//! handler before returning.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use shardplane_core::{
    DrainObserver, ElectorFactory, NamespaceConfig, ShardDistributionConfig,
};

use crate::errors::{ManagerError, ManagerResult};
use crate::handler::NamespaceHandler;
use crate::notifications::{LeadershipBus, LeadershipChange};

/// Supervisor tunables.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// First pause before reconstructing an elector after its stream closed
    /// unexpectedly.
    pub retry_backoff_base: Duration,

    /// Ceiling for the exponentially growing reconstruct pause.
    pub retry_backoff_max: Duration,

    /// Buffered leadership events per notification subscriber.
    pub notification_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            retry_backoff_base: Duration::from_millis(100),
            retry_backoff_max: Duration::from_secs(10),
            notification_capacity: 128,
        }
    }
}

struct NamespaceEntry {
    /// Completed when the handler task has fully unwound; `stop` joins on it.
    cleanup: JoinHandle<()>,
    leadership: watch::Receiver<bool>,
}

/// Lifecycle supervisor for per-namespace leader election.
///
/// `start` spawns the handler tasks; `stop` cancels the internal root token,
/// which cascades to every handler and elector, then waits for each handler
/// to finish. The root token is detached from any caller context so a
/// timeout around the `start` call cannot kill the handlers it launched.
pub struct NamespaceManager {
    config: ShardDistributionConfig,
    manager_config: ManagerConfig,
    factory: Arc<dyn ElectorFactory>,
    drain_observer: Option<Arc<dyn DrainObserver>>,
    notifications: LeadershipBus,
    namespaces: HashMap<String, NamespaceEntry>,
    cancel: Option<CancellationToken>,
}

impl NamespaceManager {
    /// Creates a manager for `config` using `factory` to construct electors.
    pub fn new(config: ShardDistributionConfig, factory: Arc<dyn ElectorFactory>) -> Self {
        let manager_config = ManagerConfig::default();
        Self {
            notifications: LeadershipBus::new(manager_config.notification_capacity),
            config,
            manager_config,
            factory,
            drain_observer: None,
            namespaces: HashMap::new(),
            cancel: None,
        }
    }

    /// Attaches a drain observer. Without one, handlers campaign for their
    /// whole lifetime and never idle.
    pub fn with_drain_observer(mut self, observer: Arc<dyn DrainObserver>) -> Self {
        self.drain_observer = Some(observer);
        self
    }

    pub fn with_config(mut self, manager_config: ManagerConfig) -> Self {
        self.notifications = LeadershipBus::new(manager_config.notification_capacity);
        self.manager_config = manager_config;
        self
    }

    /// Subscribes to leadership transitions across all namespaces.
    pub fn subscribe(&self) -> broadcast::Receiver<LeadershipChange> {
        self.notifications.subscribe()
    }

    /// Watch over the current leadership of one namespace, or `None` when
    /// the namespace is not running.
    pub fn leadership(&self, namespace: &str) -> Option<watch::Receiver<bool>> {
        self.namespaces
            .get(namespace)
            .map(|entry| entry.leadership.clone())
    }

    /// Whether this process currently leads `namespace`.
    pub fn is_leader(&self, namespace: &str) -> bool {
        self.namespaces
            .get(namespace)
            .map(|entry| *entry.leadership.borrow())
            .unwrap_or(false)
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    /// Validates every configured namespace, then starts one handler task
    /// per namespace.
    ///
    /// Validation failures abort the whole startup before anything is
    /// spawned; the manager never partially starts. Returns once every
    /// handler task has been launched.
    pub async fn start(&mut self) -> ManagerResult<()> {
        if self.cancel.is_some() {
            return Err(ManagerError::AlreadyRunning);
        }

        let mut seen = HashSet::new();
        for ns in &self.config.namespaces {
            if !seen.insert(ns.name.clone()) {
                return Err(ManagerError::DuplicateNamespace {
                    namespace: ns.name.clone(),
                });
            }
            ns.validate().map_err(|source| ManagerError::InvalidNamespace {
                namespace: ns.name.clone(),
                source,
            })?;
            self.factory
                .validate(ns)
                .map_err(|source| ManagerError::ElectorInit {
                    namespace: ns.name.clone(),
                    source,
                })?;
        }

        // Detached root token: handler lifetime is bounded by stop(), not by
        // whatever context the start call ran under.
        let cancel = CancellationToken::new();
        for ns in self.config.namespaces.clone() {
            info!("Starting namespace handler for {}", ns.name);
            self.handle_namespace(ns, &cancel);
        }
        self.cancel = Some(cancel);

        Ok(())
    }

    /// Gracefully stops all namespace handlers.
    ///
    /// Cancels the root token, which cascades to all handler and elector
    /// tokens, then waits for every handler task to finish.
    pub async fn stop(&mut self) -> ManagerResult<()> {
        let cancel = self.cancel.take().ok_or(ManagerError::NotRunning)?;
        cancel.cancel();

        for (name, entry) in self.namespaces.drain() {
            info!("Waiting for namespace handler {} to stop", name);
            if let Err(err) = entry.cleanup.await {
                warn!("Namespace handler {} terminated abnormally: {}", name, err);
            }
        }

        Ok(())
    }

    fn handle_namespace(&mut self, namespace: NamespaceConfig, cancel: &CancellationToken) {
        let (leadership_tx, leadership_rx) = watch::channel(false);
        let handler = NamespaceHandler {
            namespace: namespace.clone(),
            factory: Arc::clone(&self.factory),
            drain_observer: self.drain_observer.clone(),
            leadership_tx,
            notifications: self.notifications.clone(),
            retry_backoff_base: self.manager_config.retry_backoff_base,
            retry_backoff_max: self.manager_config.retry_backoff_max,
        };

        let cleanup = tokio::spawn(handler.run(cancel.clone()));
        self.namespaces.insert(
            namespace.name,
            NamespaceEntry {
                cleanup,
                leadership: leadership_rx,
            },
        );
    }
}
