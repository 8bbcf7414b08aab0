//! Close-to-broadcast drain signal plumbing.
//!
//! An infrastructure drain (for example a zone drain removing this instance
//! from service discovery) is published to any number of concurrent observers
//! by cancelling a shared token; a fresh token then represents the opposite
//! edge of the cycle. A cancelled token wakes every waiter and stays
//! cancelled, so an observer that looks after the edge fired still sees it.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Read side of the drain/undrain edge signals.
///
/// Callers MUST snapshot the returned token once and then wait on that
/// snapshot for the whole wait. Re-reading inside a wait loop would swap in a
/// fresh token mid-wait and lose an already-fired edge.
pub trait DrainObserver: Send + Sync {
    /// The current drain edge. Cancelled when a drain occurs, and already
    /// cancelled when read while drained.
    fn drain(&self) -> CancellationToken;

    /// The current undrain edge. Dual of [`DrainObserver::drain`].
    fn undrain(&self) -> CancellationToken;
}

#[derive(Debug)]
struct DrainCycle {
    drained: bool,
    drain: CancellationToken,
    undrain: CancellationToken,
}

/// Shared drain state with close-to-broadcast semantics.
///
/// The write side (`notify_drain` / `notify_undrain`) is driven by whatever
/// watches the infrastructure signal; the read side is the [`DrainObserver`]
/// impl. A drain edge cancels the drain token and installs the fresh undrain
/// token that will end the cycle; an undrain edge cancels the undrain token
/// and installs the fresh drain token for the next cycle. Both directions
/// stay observable until consumed by the opposite edge.
#[derive(Debug)]
pub struct DrainSignal {
    cycle: Mutex<DrainCycle>,
}

impl DrainSignal {
    pub fn new() -> Self {
        Self {
            cycle: Mutex::new(DrainCycle {
                drained: false,
                drain: CancellationToken::new(),
                undrain: CancellationToken::new(),
            }),
        }
    }

    /// Whether the instance is currently drained.
    pub fn is_drained(&self) -> bool {
        self.cycle.lock().drained
    }

    /// Publishes a drain edge to all observers.
    ///
    /// A drain while already drained is observer misuse; it is ignored so
    /// that each edge token is cancelled at most once.
    pub fn notify_drain(&self) {
        let mut cycle = self.cycle.lock();
        if cycle.drained {
            warn!("Duplicate drain signal ignored");
            return;
        }
        cycle.drained = true;
        // Fresh undrain edge for the cycle this drain opens, installed before
        // the drain fires so a woken observer always snapshots the new one.
        cycle.undrain = CancellationToken::new();
        cycle.drain.cancel();
        info!("Drain signal published");
    }

    /// Publishes an undrain edge to all observers, completing the cycle.
    pub fn notify_undrain(&self) {
        let mut cycle = self.cycle.lock();
        if !cycle.drained {
            warn!("Undrain signal without a preceding drain ignored");
            return;
        }
        cycle.drained = false;
        cycle.drain = CancellationToken::new();
        cycle.undrain.cancel();
        info!("Undrain signal published");
    }
}

impl Default for DrainSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainObserver for DrainSignal {
    fn drain(&self) -> CancellationToken {
        self.cycle.lock().drain.clone()
    }

    fn undrain(&self) -> CancellationToken {
        self.cycle.lock().undrain.clone()
    }
}
