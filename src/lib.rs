//! # Partwise
//! Static, negotiation-free partition ownership for parallel log readers.
//!
//! A stream-processing job runs a fixed number of reader tasks against one
//! Kafka-style topic. Partwise lets each task work out on its own which
//! partitions it reads: task `i` of `n` owns every partition `p` with
//! `p mod n == i`. Each task periodically re-reads the topic's partition map
//! from the broker metadata store, opens a partition manager for newly owned
//! partitions, closes managers for partitions it no longer owns, and leaves
//! everything else alone.
//!
//! ## Getting started
//!
//! Implement the collaborator traits in [`coordinator`] for your metadata
//! client and per-partition consumer, then ask the coordinator for its
//! managers on every poll:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use partwise::prelude::*;
//!
//! async fn poll_loop<M, F>(
//!     connector: M,
//!     factory: Arc<F>,
//!     state_store: Arc<dyn StateStore>,
//!     connections: Arc<dyn PartitionConnections>,
//! ) -> CoordinatorResult<()>
//! where
//!     M: MetadataConnector,
//!     F: PartitionManagerFactory,
//! {
//!     let config = CoordinatorConfig::from_env()?;
//!     let coordinator =
//!         PartitionCoordinator::new(config, connector, factory, state_store, connections)?;
//!
//!     loop {
//!         for manager in coordinator.managed_partitions().await?.iter() {
//!             let _ = manager.partition();
//!         }
//!     }
//! }
//! ```
//!
//! ## Failure model
//!
//! Metadata store outages are absorbed: the coordinator keeps serving its
//! last known partition set and retries on the next call. Everything else
//! (bad configuration, malformed metadata, a manager that cannot open) is
//! returned to the caller so the task can crash and be restarted by its
//! supervisor.

#![forbid(unsafe_code)]

pub mod constants;
pub mod coordinator;
pub mod telemetry;
pub mod types;

pub mod prelude {
    //! Everything a reader task needs to drive a coordinator.
    pub use crate::coordinator::{
        BrokerMetadataSource, CoordinatorConfig, CoordinatorError, CoordinatorResult,
        GlobalPartitionMap, ManagedPartitions, ManagerContext, ManagerHandle,
        MetadataConnector, Partition, PartitionConnections, PartitionCoordinator,
        PartitionManagerFactory, RefreshOutcome, StateStore, TaskAssignment,
    };
    pub use crate::types::{BrokerEndpoint, PartitionIndex};
}
