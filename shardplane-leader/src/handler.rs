//! Per-namespace election state machine.
//!
//! Each handler toggles between an active campaign and a drained idle state
//! until its parent token is cancelled. Three asynchronous event sources are
//! raced in every campaign: parent shutdown, the drain edge snapshot, and
//! leadership events from the running elector. The selects are `biased` so
//! that shutdown always beats a drain and a drain always beats a leadership
//! event observed in the same wakeup.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use shardplane_core::{DrainObserver, ElectorFactory, NamespaceConfig};

use crate::notifications::{LeadershipBus, LeadershipChange};

/// The election state machine's transition result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElectionState {
    /// Campaigning or holding leadership
    Active,
    /// Voluntarily resigned because drained
    Idle,
    /// Terminal: parent cancelled, or elector construction failed permanently
    Stopped,
}

/// One handler per configured namespace, owned by the manager for its whole
/// lifetime. Holds only downward references.
pub(crate) struct NamespaceHandler {
    pub(crate) namespace: NamespaceConfig,
    pub(crate) factory: Arc<dyn ElectorFactory>,
    pub(crate) drain_observer: Option<Arc<dyn DrainObserver>>,
    pub(crate) leadership_tx: watch::Sender<bool>,
    pub(crate) notifications: LeadershipBus,
    pub(crate) retry_backoff_base: Duration,
    pub(crate) retry_backoff_max: Duration,
}

impl NamespaceHandler {
    /// Runs the election loop until the parent token is cancelled.
    ///
    /// Consecutive `Active` retries (transient elector failures) back off
    /// exponentially; any other transition resets the backoff.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        info!(
            "Starting election handler for namespace {}",
            self.namespace.name
        );

        let mut state = ElectionState::Active;
        let mut retry_delay = self.retry_backoff_base;
        loop {
            state = match state {
                ElectionState::Active => match self.campaign(&cancel).await {
                    ElectionState::Active => {
                        let next = self.retry_pause(&cancel, retry_delay).await;
                        retry_delay = (retry_delay * 2).min(self.retry_backoff_max);
                        next
                    }
                    other => {
                        retry_delay = self.retry_backoff_base;
                        other
                    }
                },
                ElectionState::Idle => self.idle(&cancel).await,
                ElectionState::Stopped => break,
            };
        }

        info!(
            "Election handler for namespace {} stopped",
            self.namespace.name
        );
    }

    /// Creates an elector and processes leadership events.
    ///
    /// Returns `Idle` when drained, `Active` to retry after a transient
    /// failure (the stream closed unexpectedly, or the store was unreachable
    /// at construction time), or `Stopped`. Only a non-retryable
    /// construction error takes the handler out of the system.
    async fn campaign(&self, cancel: &CancellationToken) -> ElectionState {
        info!(
            "Entering active campaign state for namespace {}",
            self.namespace.name
        );

        // Snapshot the current drain edge. The observer is close-to-broadcast,
        // so if a drain already happened this token is cancelled and the
        // checks below fire immediately.
        let drain = self.drain_edge();

        // Already drained: skip elector construction for this cycle.
        if drain.is_cancelled() {
            info!(
                "Drain signal detected before campaign start for namespace {}",
                self.namespace.name
            );
            return ElectionState::Idle;
        }

        let elector_cancel = cancel.child_token();
        let elector = tokio::select! {
            biased;

            _ = cancel.cancelled() => return ElectionState::Stopped,

            created = self.factory.create_elector(&self.namespace) => match created {
                Ok(elector) => elector,
                Err(err) if err.is_retryable() => {
                    warn!(
                        "Transient elector construction failure for namespace {}: {}",
                        self.namespace.name, err
                    );
                    return ElectionState::Active;
                }
                Err(err) => {
                    error!(
                        "Failed to create elector for namespace {}: {}",
                        self.namespace.name, err
                    );
                    return ElectionState::Stopped;
                }
            }
        };

        let mut leadership = elector.run(elector_cancel.clone());

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    elector_cancel.cancel();
                    self.clear_leadership();
                    return ElectionState::Stopped;
                }

                _ = drain.cancelled() => {
                    info!(
                        "Drain signal received, resigning from election for namespace {}",
                        self.namespace.name
                    );
                    elector_cancel.cancel();
                    self.clear_leadership();
                    return ElectionState::Idle;
                }

                event = leadership.recv() => match event {
                    Some(is_leader) => self.record_leadership(is_leader),
                    None => {
                        error!(
                            "Leadership channel closed unexpectedly for namespace {}",
                            self.namespace.name
                        );
                        elector_cancel.cancel();
                        self.clear_leadership();
                        return ElectionState::Active;
                    }
                }
            }
        }
    }

    /// Waits for an undrain signal to resume campaigning.
    async fn idle(&self, cancel: &CancellationToken) -> ElectionState {
        info!(
            "Entering idle state (drained) for namespace {}",
            self.namespace.name
        );

        // Snapshot the current undrain edge; see campaign() for the
        // close-to-broadcast discipline.
        let undrain = self.undrain_edge();

        tokio::select! {
            biased;

            _ = cancel.cancelled() => ElectionState::Stopped,

            _ = undrain.cancelled() => {
                info!(
                    "Undrain signal received, resuming campaign for namespace {}",
                    self.namespace.name
                );
                ElectionState::Active
            }
        }
    }

    /// Cancellable pause before reconstructing an elector after a transient
    /// failure, with jitter so a fleet-wide store blip does not produce a
    /// thundering herd of campaigns.
    async fn retry_pause(&self, cancel: &CancellationToken, delay: Duration) -> ElectionState {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => ElectionState::Stopped,
            _ = tokio::time::sleep(jittered(delay)) => ElectionState::Active,
        }
    }

    fn record_leadership(&self, is_leader: bool) {
        if is_leader {
            info!("Became leader for namespace {}", self.namespace.name);
        } else {
            info!("Lost leadership for namespace {}", self.namespace.name);
        }
        self.leadership_tx.send_replace(is_leader);
        self.notifications.publish(if is_leader {
            LeadershipChange::Gained {
                namespace: self.namespace.name.clone(),
            }
        } else {
            LeadershipChange::Lost {
                namespace: self.namespace.name.clone(),
            }
        });
    }

    /// Marks leadership lost if currently held. Resigning cancels the
    /// elector's token, so the lease is released by the time this runs.
    fn clear_leadership(&self) {
        if *self.leadership_tx.borrow() {
            self.record_leadership(false);
        }
    }

    fn drain_edge(&self) -> CancellationToken {
        match &self.drain_observer {
            Some(observer) => observer.drain(),
            // No observer configured: a token nobody cancels, so the drain
            // branch blocks forever and the handler stays active.
            None => CancellationToken::new(),
        }
    }

    fn undrain_edge(&self) -> CancellationToken {
        match &self.drain_observer {
            Some(observer) => observer.undrain(),
            None => CancellationToken::new(),
        }
    }
}

fn jittered(delay: Duration) -> Duration {
    let millis = delay.as_millis() as u64;
    if millis == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=millis / 4))
}
