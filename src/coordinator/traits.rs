//! Collaborator traits at the coordinator's boundary.
//!
//! The coordinator owns no wire protocol or file format of its own. It talks
//! to the outside world through these traits, which lets the production
//! metadata client, the per-partition consumers and the in-memory test
//! doubles in [`mock`](super::mock) be swapped freely.
//!
//! # Trait Map
//!
//! - [`MetadataConnector`] / [`BrokerMetadataSource`]: where the partition map comes from
//! - [`PartitionManagerFactory`] / [`ManagerHandle`]: per-partition consumption state
//! - [`StateStore`] / [`PartitionConnections`]: resources handed through to managers

use std::sync::Arc;

use async_trait::async_trait;

use super::error::CoordinatorResult;
use super::partition::{GlobalPartitionMap, Partition};
use crate::types::{BrokerEndpoint, PartitionIndex};

/// Live connection to the broker metadata store.
#[async_trait]
pub trait BrokerMetadataSource: Send + Sync {
    /// Fetch every partition of the topic and the broker serving it.
    ///
    /// Network faults must be reported as transient errors
    /// (see [`CoordinatorError::is_transient`]); anything else is fatal.
    ///
    /// [`CoordinatorError::is_transient`]: super::CoordinatorError::is_transient
    async fn fetch(&self) -> CoordinatorResult<GlobalPartitionMap>;
}

/// Creates fresh metadata connections.
///
/// After a transient fetch failure the coordinator drops its current source
/// and asks the connector for a new one.
#[async_trait]
pub trait MetadataConnector: Send + Sync {
    type Source: BrokerMetadataSource;

    async fn connect(&self) -> CoordinatorResult<Self::Source>;
}

/// Opened consumption state for one partition.
#[async_trait]
pub trait ManagerHandle: Send + Sync {
    /// Partition this handle consumes.
    fn partition(&self) -> &Partition;

    /// Release all resources held for the partition.
    ///
    /// Called at most once per handle, after it has left the registry.
    async fn close(&self) -> CoordinatorResult<()>;
}

/// Constructs [`ManagerHandle`]s for newly owned partitions.
#[async_trait]
pub trait PartitionManagerFactory: Send + Sync {
    type Handle: ManagerHandle + 'static;

    async fn open(
        &self,
        partition: &Partition,
        ctx: &ManagerContext,
    ) -> CoordinatorResult<Self::Handle>;
}

/// Persisted store for per-partition offset checkpoints.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn read(&self, path: &str) -> CoordinatorResult<Option<Vec<u8>>>;

    async fn write(&self, path: &str, data: Vec<u8>) -> CoordinatorResult<()>;
}

/// Broker connection pool shared by the partition managers of one task.
pub trait PartitionConnections: Send + Sync {
    /// Take a reference on the connection to `broker` for `partition`.
    fn register(&self, broker: &BrokerEndpoint, partition: PartitionIndex);

    /// Drop the reference taken by [`register`](Self::register).
    fn unregister(&self, broker: &BrokerEndpoint, partition: PartitionIndex);
}

/// Everything a factory needs besides the partition itself.
#[derive(Clone)]
pub struct ManagerContext {
    pub topic: Arc<str>,
    pub generation_id: Arc<str>,
    pub state_store: Arc<dyn StateStore>,
    pub connections: Arc<dyn PartitionConnections>,
}

impl ManagerContext {
    pub fn new(
        topic: impl Into<Arc<str>>,
        generation_id: impl Into<Arc<str>>,
        state_store: Arc<dyn StateStore>,
        connections: Arc<dyn PartitionConnections>,
    ) -> Self {
        Self {
            topic: topic.into(),
            generation_id: generation_id.into(),
            state_store,
            connections,
        }
    }
}

impl std::fmt::Debug for ManagerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerContext")
            .field("topic", &self.topic)
            .field("generation_id", &self.generation_id)
            .finish_non_exhaustive()
    }
}
