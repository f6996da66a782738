//! In-memory collaborators for testing.
//!
//! Scriptable stand-ins for the metadata store, the partition-manager
//! factory and the resources handed to managers. They record every call so
//! tests can assert on fetch counts, open/close order and handle identity.
//!
//! # Usage
//!
//! This module is available when the `test-utilities` feature is enabled,
//! or during unit tests:
//!
//! ```toml
//! [dev-dependencies]
//! partwise = { path = ".", features = ["test-utilities"] }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::error::{CoordinatorError, CoordinatorResult};
use super::partition::{GlobalPartitionMap, Partition};
use super::traits::{
    BrokerMetadataSource, ManagerContext, ManagerHandle, MetadataConnector,
    PartitionConnections, PartitionManagerFactory, StateStore,
};
use crate::types::{BrokerEndpoint, PartitionIndex};

/// Poison-tolerant lock; a panicking test must not cascade into others.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Broker that serves `index` in generated partition maps.
pub fn default_broker(index: i32) -> BrokerEndpoint {
    BrokerEndpoint::new(format!("broker-{}", index.rem_euclid(3)), 9092)
}

// ============================================================================
// Metadata
// ============================================================================

#[derive(Debug, Default)]
struct MetadataState {
    topic: String,
    partitions: Mutex<Vec<Partition>>,
    fetch_failures: Mutex<VecDeque<CoordinatorError>>,
    connect_failures: Mutex<VecDeque<CoordinatorError>>,
    fetch_delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
    connects: AtomicUsize,
}

/// Scriptable metadata store.
///
/// Cloning shares the underlying state, so a test can keep one clone to
/// reshape the topic while the coordinator holds the connector.
#[derive(Debug, Clone)]
pub struct MockMetadataConnector {
    state: Arc<MetadataState>,
}

impl MockMetadataConnector {
    /// Create a connector for `topic` with no partitions.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            state: Arc::new(MetadataState {
                topic: topic.into(),
                ..Default::default()
            }),
        }
    }

    /// Create a connector whose topic has partitions `0..count`.
    pub fn with_partitions(topic: impl Into<String>, count: i32) -> Self {
        let connector = Self::new(topic);
        connector.set_partition_count(count);
        connector
    }

    /// Replace the topic with partitions `0..count`.
    pub fn set_partition_count(&self, count: i32) {
        let partitions = (0..count)
            .map(|i| Partition::new(i, default_broker(i)))
            .collect();
        self.set_partitions(partitions);
    }

    /// Replace the partition list verbatim (duplicates are not filtered).
    pub fn set_partitions(&self, partitions: Vec<Partition>) {
        *lock(&self.state.partitions) = partitions;
    }

    /// Keep only partitions for which `keep` returns true.
    pub fn retain_partitions(&self, keep: impl Fn(&Partition) -> bool) {
        lock(&self.state.partitions).retain(|p| keep(p));
    }

    /// Move `index` to another broker without changing its identity.
    pub fn move_partition(&self, index: i32, broker: BrokerEndpoint) {
        for partition in lock(&self.state.partitions).iter_mut() {
            if partition.index.value() == index {
                partition.broker = broker.clone();
            }
        }
    }

    /// Make the next fetch fail with a connection-refused error.
    pub fn fail_next_fetch_transient(&self) {
        self.fail_next_fetch_with(CoordinatorError::connectivity(
            io::ErrorKind::ConnectionRefused,
            "metadata store refused connection",
        ));
    }

    /// Make the next fetch fail with `error`.
    pub fn fail_next_fetch_with(&self, error: CoordinatorError) {
        lock(&self.state.fetch_failures).push_back(error);
    }

    /// Make the next connect fail with `error`.
    pub fn fail_next_connect_with(&self, error: CoordinatorError) {
        lock(&self.state.connect_failures).push_back(error);
    }

    /// Delay every fetch by `delay` (uses tokio time, so it can be paused).
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *lock(&self.state.fetch_delay) = delay;
    }

    /// Number of fetch attempts, including failed ones.
    pub fn fetch_count(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    /// Number of connect attempts, including failed ones.
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataConnector for MockMetadataConnector {
    type Source = MockMetadataSource;

    async fn connect(&self) -> CoordinatorResult<MockMetadataSource> {
        let connection_id = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(err) = lock(&self.state.connect_failures).pop_front() {
            return Err(err);
        }
        Ok(MockMetadataSource {
            state: Arc::clone(&self.state),
            connection_id,
        })
    }
}

/// One connection handed out by [`MockMetadataConnector`].
#[derive(Debug)]
pub struct MockMetadataSource {
    state: Arc<MetadataState>,
    connection_id: usize,
}

impl MockMetadataSource {
    /// 1-based sequence number of the connect call that produced this source.
    pub fn connection_id(&self) -> usize {
        self.connection_id
    }
}

#[async_trait]
impl BrokerMetadataSource for MockMetadataSource {
    async fn fetch(&self) -> CoordinatorResult<GlobalPartitionMap> {
        self.state.fetches.fetch_add(1, Ordering::SeqCst);

        let delay = *lock(&self.state.fetch_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = lock(&self.state.fetch_failures).pop_front() {
            return Err(err);
        }

        let partitions = lock(&self.state.partitions).clone();
        GlobalPartitionMap::new(&self.state.topic, partitions)
    }
}

// ============================================================================
// Partition Managers
// ============================================================================

#[derive(Debug, Default)]
struct FactoryState {
    opened: Mutex<Vec<PartitionIndex>>,
    closed: Mutex<Vec<PartitionIndex>>,
    fail_open: Mutex<HashSet<PartitionIndex>>,
    fail_close: Mutex<HashSet<PartitionIndex>>,
}

/// Factory producing [`MockHandle`]s and recording the lifecycle of each.
#[derive(Debug, Clone, Default)]
pub struct MockManagerFactory {
    state: Arc<FactoryState>,
}

impl MockManagerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future open of `partition` fail.
    pub fn fail_open_for(&self, partition: PartitionIndex) {
        lock(&self.state.fail_open).insert(partition);
    }

    /// Make every future close of `partition` fail.
    pub fn fail_close_for(&self, partition: PartitionIndex) {
        lock(&self.state.fail_close).insert(partition);
    }

    /// Partitions opened so far, in call order.
    pub fn opened(&self) -> Vec<PartitionIndex> {
        lock(&self.state.opened).clone()
    }

    /// Partitions closed so far (successfully or not), in call order.
    pub fn closed(&self) -> Vec<PartitionIndex> {
        lock(&self.state.closed).clone()
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state.opened).len()
    }

    pub fn close_count(&self) -> usize {
        lock(&self.state.closed).len()
    }
}

#[async_trait]
impl PartitionManagerFactory for MockManagerFactory {
    type Handle = MockHandle;

    async fn open(&self, partition: &Partition, ctx: &ManagerContext) -> CoordinatorResult<MockHandle> {
        if lock(&self.state.fail_open).contains(&partition.index) {
            return Err(CoordinatorError::ManagerOpen {
                partition: partition.index,
                message: "injected open failure".to_string(),
            });
        }

        let checkpoint_path = checkpoint_path(ctx, partition);
        let restored_checkpoint = ctx.state_store.read(&checkpoint_path).await?;
        ctx.connections.register(&partition.broker, partition.index);
        lock(&self.state.opened).push(partition.index);

        Ok(MockHandle {
            partition: partition.clone(),
            ctx: ctx.clone(),
            checkpoint_path,
            restored_checkpoint,
            closed: AtomicBool::new(false),
            factory: Arc::clone(&self.state),
        })
    }
}

fn checkpoint_path(ctx: &ManagerContext, partition: &Partition) -> String {
    format!("/{}/{}", ctx.topic, partition.id())
}

/// Handle for one mock partition consumer.
///
/// On open it restores the checkpoint under `/<topic>/partition_<n>` and
/// registers with the connection pool; on close it writes the generation id
/// as the checkpoint and unregisters.
#[derive(Debug)]
pub struct MockHandle {
    partition: Partition,
    ctx: ManagerContext,
    checkpoint_path: String,
    restored_checkpoint: Option<Vec<u8>>,
    closed: AtomicBool,
    factory: Arc<FactoryState>,
}

impl MockHandle {
    pub fn topic(&self) -> &str {
        &self.ctx.topic
    }

    pub fn generation_id(&self) -> &str {
        &self.ctx.generation_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Checkpoint found in the state store when this handle was opened.
    pub fn restored_checkpoint(&self) -> Option<&[u8]> {
        self.restored_checkpoint.as_deref()
    }
}

#[async_trait]
impl ManagerHandle for MockHandle {
    fn partition(&self) -> &Partition {
        &self.partition
    }

    async fn close(&self) -> CoordinatorResult<()> {
        lock(&self.factory.closed).push(self.partition.index);
        self.closed.store(true, Ordering::SeqCst);
        self.ctx
            .connections
            .unregister(&self.partition.broker, self.partition.index);

        if lock(&self.factory.fail_close).contains(&self.partition.index) {
            return Err(CoordinatorError::ManagerClose {
                partition: self.partition.index,
                message: "injected close failure".to_string(),
            });
        }

        self.ctx
            .state_store
            .write(
                &self.checkpoint_path,
                self.ctx.generation_id.as_bytes().to_vec(),
            )
            .await
    }
}

// ============================================================================
// Manager Resources
// ============================================================================

/// Offset checkpoint store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MockStateStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.entries).get(path).cloned()
    }
}

#[async_trait]
impl StateStore for MockStateStore {
    async fn read(&self, path: &str) -> CoordinatorResult<Option<Vec<u8>>> {
        Ok(self.get(path))
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> CoordinatorResult<()> {
        lock(&self.entries).insert(path.to_string(), data);
        Ok(())
    }
}

/// Reference-counting stand-in for the broker connection pool.
#[derive(Debug, Default)]
pub struct MockConnections {
    refs: Mutex<HashMap<BrokerEndpoint, HashSet<PartitionIndex>>>,
}

impl MockConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partitions currently holding a reference on `broker`.
    pub fn partitions_on(&self, broker: &BrokerEndpoint) -> usize {
        lock(&self.refs).get(broker).map_or(0, |set| set.len())
    }

    /// Number of brokers with at least one reference.
    pub fn open_connections(&self) -> usize {
        lock(&self.refs).len()
    }
}

impl PartitionConnections for MockConnections {
    fn register(&self, broker: &BrokerEndpoint, partition: PartitionIndex) {
        lock(&self.refs)
            .entry(broker.clone())
            .or_default()
            .insert(partition);
    }

    fn unregister(&self, broker: &BrokerEndpoint, partition: PartitionIndex) {
        let mut refs = lock(&self.refs);
        if let Some(set) = refs.get_mut(broker) {
            set.remove(&partition);
            if set.is_empty() {
                refs.remove(broker);
            }
        }
    }
}
