//! # Shardplane Core
//!
//! Leaf abstractions for the shardplane shard-distribution control plane.
//!
//! This crate provides the building blocks that the leader-election
//! supervisor composes:
//!
//! - **NamespaceConfig**: identity and election parameters for one namespace
//! - **Elector / ElectorFactory**: capability traits over the underlying
//!   consensus store's keyed-lease election primitive
//! - **DrainSignal**: close-to-broadcast drain/undrain edge signals
//! - **Error Handling**: election error types and retryability classification
//!
//! The actual consensus store (etcd or similar) and the shard-distribution
//! workload a leader performs are external collaborators; only their
//! contracts live here.

pub mod config;
pub mod drain;
pub mod election;
pub mod error;

pub use config::{NamespaceConfig, ShardDistributionConfig};
pub use drain::{DrainObserver, DrainSignal};
pub use election::{Elector, ElectorFactory, LeadershipEvents};
pub use error::{ElectionError, ElectionResult};
