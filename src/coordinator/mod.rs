//! Static partition ownership for parallel topic readers.
//!
//! A fixed pool of `total_tasks` reader tasks splits one log topic without
//! talking to each other. Every task runs a [`PartitionCoordinator`] that
//! periodically reads the topic's partition map from the metadata store and
//! keeps one partition manager open for each partition it owns.
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────────┐  fetch   ┌─────────────────────────┐
//!   │ Metadata store   │ ◄─────── │  PartitionCoordinator   │
//!   │ (partition map)  │          │  task i of n            │
//!   └──────────────────┘          │                         │
//!                                 │  RefreshCache (TTL)     │
//!                                 │  owns(p) = p mod n == i │
//!                                 │  PartitionManagerRegistry
//!                                 └───────────┬─────────────┘
//!                                   open/close│
//!                      ┌──────────────────────┼──────────────────────┐
//!                      ▼                      ▼                      ▼
//!               ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//!               │ Manager p=i │        │ Manager i+n │        │ Manager i+2n│
//!               └─────────────┘        └─────────────┘        └─────────────┘
//! ```
//!
//! Ownership is a pure function of the partition index and the task
//! position, so every task computes a disjoint slice of the same map and
//! together they cover it exactly. There is no negotiation and no rebalance.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use partwise::coordinator::{CoordinatorConfig, PartitionCoordinator};
//!
//! let config = CoordinatorConfig::from_env()?;
//! let coordinator = PartitionCoordinator::new(
//!     config,
//!     zk_connector,
//!     Arc::new(consumer_factory),
//!     state_store,
//!     connections,
//! )?;
//!
//! loop {
//!     for manager in coordinator.managed_partitions().await?.iter() {
//!         manager.next_batch().await?;
//!     }
//! }
//! ```

mod config;
mod error;
pub mod metrics;
#[cfg(any(test, feature = "test-utilities"))]
pub mod mock;
mod ownership;
mod partition;
mod partition_coordinator;
mod refresh_cache;
pub mod registration;
mod registry;
mod traits;

pub use config::{CoordinatorConfig, MetadataStoreConfig};
pub use error::{CoordinatorError, CoordinatorResult};
pub use ownership::{TaskAssignment, owns};
pub use partition::{GlobalPartitionMap, Partition};
pub use partition_coordinator::{
    CloseFailures, ManagedPartitions, PartitionCoordinator, ReconcileReport, RefreshOutcome,
};
pub use refresh_cache::{Clock, ManualClock, RefreshCache, SystemClock};
pub use registration::{BrokerRegistration, PartitionLeader, assemble_partition_map};
pub use registry::{HandleOf, PartitionManagerRegistry};
pub use traits::{
    BrokerMetadataSource, ManagerContext, ManagerHandle, MetadataConnector,
    PartitionConnections, PartitionManagerFactory, StateStore,
};
