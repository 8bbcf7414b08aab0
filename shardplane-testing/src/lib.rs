//! Test infrastructure for shardplane.
//!
//! Provides two elector backends that stand in for a real consensus store:
//! scripted electors that replay predetermined leadership events (for driving
//! the election state machine deterministically), and an in-memory
//! first-come-wins lease store (for exercising genuine contention and
//! failover between processes).

pub mod lease;
pub mod scripted;

pub use lease::{InMemoryLeaseStore, LeaseElectorFactory};
pub use scripted::{CreateFailure, ElectorScript, ScriptedElectorFactory};
