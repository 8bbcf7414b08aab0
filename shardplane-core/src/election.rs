//! Elector capability traits.
//!
//! An elector campaigns for a keyed lease in the underlying consensus store
//! on behalf of this process. The store itself is out of scope; these traits
//! are the seam the supervisor consumes and the seam store integrations (and
//! test harnesses) implement.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::NamespaceConfig;
use crate::error::ElectionResult;

/// Stream of leadership transitions emitted by a running elector.
///
/// `true` means this process just gained leadership, `false` that it just
/// lost it. Re-election across processes may produce `true, false, true`
/// without the local caller doing anything. The channel closing means the
/// elector has stopped emitting.
pub type LeadershipEvents = mpsc::Receiver<bool>;

/// A single campaign lifetime for one namespace.
pub trait Elector: Send + Sync {
    /// Begins campaigning and returns the leadership event stream.
    ///
    /// Cancelling `cancel` is the only graceful way to stop the campaign; the
    /// implementation must resign the lease promptly (bounded by the store's
    /// session TTL) and then close the stream.
    ///
    /// Consumes the elector: a closed stream cannot be restarted, a fresh
    /// elector must be created instead. Callers must not assume an initial
    /// event; the first value may be either `true` or `false`.
    fn run(self: Box<Self>, cancel: CancellationToken) -> LeadershipEvents;
}

/// Constructs electors scoped to one namespace and one campaign.
#[async_trait]
pub trait ElectorFactory: Send + Sync {
    /// Creates an elector for `namespace`. The returned elector is not yet
    /// campaigning.
    ///
    /// Fails with [`ElectionError::Config`](crate::ElectionError::Config)
    /// when the namespace is misconfigured and with
    /// [`ElectionError::StoreUnavailable`](crate::ElectionError::StoreUnavailable)
    /// when the store cannot be reached at construction time.
    async fn create_elector(
        &self,
        namespace: &NamespaceConfig,
    ) -> ElectionResult<Box<dyn Elector>>;

    /// Synchronous startup check for `namespace`, called once per namespace
    /// before any handler is spawned. The default accepts everything.
    fn validate(&self, namespace: &NamespaceConfig) -> ElectionResult<()> {
        let _ = namespace;
        Ok(())
    }
}
