//! Leadership change notifications.
//!
//! The handler state machine records every leadership transition onto a
//! broadcast bus so the shard-distribution workload (and anything else) can
//! react without being wired into the election loop. Lagging subscribers
//! lose old events rather than ever blocking a handler.

use tokio::sync::broadcast;
use tracing::debug;

/// A leadership transition observed by one namespace handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadershipChange {
    /// This process became leader for the namespace
    Gained { namespace: String },

    /// This process lost leadership for the namespace, whether taken over by
    /// another process or resigned locally (drain, retry, shutdown)
    Lost { namespace: String },
}

impl LeadershipChange {
    /// The namespace the transition belongs to.
    pub fn namespace(&self) -> &str {
        match self {
            Self::Gained { namespace } | Self::Lost { namespace } => namespace,
        }
    }

    /// Whether this transition means the process now holds leadership.
    pub fn is_gained(&self) -> bool {
        matches!(self, Self::Gained { .. })
    }
}

/// Broadcast bus for leadership transitions across all namespaces.
#[derive(Debug, Clone)]
pub struct LeadershipBus {
    tx: broadcast::Sender<LeadershipChange>,
}

impl LeadershipBus {
    /// Creates a bus retaining up to `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to all future leadership transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<LeadershipChange> {
        self.tx.subscribe()
    }

    /// Publishes a transition. Fire-and-forget: a bus with no subscribers
    /// drops the event.
    pub(crate) fn publish(&self, change: LeadershipChange) {
        debug!(
            "Publishing leadership change for namespace {}: gained={}",
            change.namespace(),
            change.is_gained()
        );
        let _ = self.tx.send(change);
    }
}
