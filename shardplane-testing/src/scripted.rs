//! Scripted electors for driving the election state machine.
//!
//! A `ScriptedElectorFactory` hands out electors that replay a predetermined
//! sequence of leadership events, optionally fail construction, or close
//! their stream early to simulate a store outage. The factory counts
//! construction calls and live campaigns so tests can assert exactly when
//! electors are built and torn down.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use shardplane_core::{
    ElectionError, ElectionResult, Elector, ElectorFactory, LeadershipEvents, NamespaceConfig,
};

/// How a scripted `create_elector` call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFailure {
    /// Permanent misconfiguration
    Config,
    /// Transient store outage at construction time
    StoreUnavailable,
}

/// Behaviour of one elector produced by the scripted factory.
#[derive(Debug, Clone, Default)]
pub struct ElectorScript {
    /// Fail the construction call instead of producing an elector.
    pub create_failure: Option<CreateFailure>,

    /// Leadership events to emit: a pause, then the event.
    pub events: Vec<(Duration, bool)>,

    /// Close the stream this long after the last event, simulating the store
    /// dropping the session. `None` keeps the stream open until cancelled.
    pub close_after: Option<Duration>,
}

impl ElectorScript {
    /// An elector that emits nothing and campaigns until cancelled.
    pub fn hold_open() -> Self {
        Self::default()
    }

    /// An elector that gains leadership after `delay` and then holds it
    /// until cancelled.
    pub fn leader_after(delay: Duration) -> Self {
        Self {
            events: vec![(delay, true)],
            ..Self::default()
        }
    }

    /// An elector replaying `events`, then holding the stream open.
    pub fn replay(events: Vec<(Duration, bool)>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    /// An elector whose stream closes after `delay` without any event.
    pub fn close_stream_after(delay: Duration) -> Self {
        Self {
            close_after: Some(delay),
            ..Self::default()
        }
    }

    /// A construction failure of the given kind.
    pub fn fail_create(kind: CreateFailure) -> Self {
        Self {
            create_failure: Some(kind),
            ..Self::default()
        }
    }

    pub fn then_close_after(mut self, delay: Duration) -> Self {
        self.close_after = Some(delay);
        self
    }
}

/// Factory whose successive `create_elector` calls pop queued scripts,
/// falling back to a default script when the queue is empty.
pub struct ScriptedElectorFactory {
    scripts: Mutex<VecDeque<ElectorScript>>,
    fallback: ElectorScript,
    create_calls: AtomicUsize,
    live_campaigns: Arc<AtomicUsize>,
}

impl ScriptedElectorFactory {
    pub fn new(fallback: ElectorScript) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback,
            create_calls: AtomicUsize::new(0),
            live_campaigns: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Queues a script for the next construction call.
    pub fn push_script(&self, script: ElectorScript) {
        self.scripts.lock().push_back(script);
    }

    /// How many electors have been constructed (or attempted).
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// How many electors are currently campaigning. A campaign ends when the
    /// elector observes cancellation (lease released) or its script closes
    /// the stream.
    pub fn live_campaigns(&self) -> usize {
        self.live_campaigns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ElectorFactory for ScriptedElectorFactory {
    async fn create_elector(
        &self,
        namespace: &NamespaceConfig,
    ) -> ElectionResult<Box<dyn Elector>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        debug!(
            "Scripted elector for namespace {}: {:?}",
            namespace.name, script
        );

        match script.create_failure {
            Some(CreateFailure::Config) => Err(ElectionError::config(format!(
                "namespace {} rejected by script",
                namespace.name
            ))),
            Some(CreateFailure::StoreUnavailable) => {
                Err(ElectionError::store_unavailable("scripted store outage"))
            }
            None => Ok(Box::new(ScriptedElector {
                script,
                live_campaigns: Arc::clone(&self.live_campaigns),
            })),
        }
    }
}

struct ScriptedElector {
    script: ElectorScript,
    live_campaigns: Arc<AtomicUsize>,
}

impl Elector for ScriptedElector {
    fn run(self: Box<Self>, cancel: CancellationToken) -> LeadershipEvents {
        let (tx, rx) = mpsc::channel(16);
        let live = self.live_campaigns;
        let script = self.script;
        live.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            replay_script(script, tx, cancel).await;
            live.fetch_sub(1, Ordering::SeqCst);
        });
        rx
    }
}

async fn replay_script(
    script: ElectorScript,
    tx: mpsc::Sender<bool>,
    cancel: CancellationToken,
) {
    for (pause, event) in script.events {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(pause) => {}
        }
        if tx.send(event).await.is_err() {
            return;
        }
    }

    match script.close_after {
        Some(pause) => {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(pause) => {}
            }
            // Dropping tx closes the stream.
        }
        None => cancel.cancelled().await,
    }
}
