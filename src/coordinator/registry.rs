//! Registry of opened partition managers.
//!
//! Maps a partition index to the handle the factory opened for it. Entries
//! are never mutated in place: a partition's handle is created by
//! [`insert`](PartitionManagerRegistry::insert) and destroyed by
//! [`remove_and_close`](PartitionManagerRegistry::remove_and_close).
//!
//! The registry itself is not synchronized; the coordinator guards it with
//! its refresh lock.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use super::error::{CoordinatorError, CoordinatorResult};
use super::partition::Partition;
use super::traits::{ManagerContext, ManagerHandle, PartitionManagerFactory};
use crate::types::PartitionIndex;

/// Type alias for the handle type a factory produces.
pub type HandleOf<F> = <F as PartitionManagerFactory>::Handle;

pub struct PartitionManagerRegistry<F: PartitionManagerFactory> {
    factory: Arc<F>,
    ctx: ManagerContext,
    managers: HashMap<PartitionIndex, Arc<HandleOf<F>>>,
}

impl<F: PartitionManagerFactory> PartitionManagerRegistry<F> {
    pub fn new(factory: Arc<F>, ctx: ManagerContext) -> Self {
        Self {
            factory,
            ctx,
            managers: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    pub fn contains(&self, partition: PartitionIndex) -> bool {
        self.managers.contains_key(&partition)
    }

    /// Indices of every registered partition, in ascending order.
    pub fn keys(&self) -> BTreeSet<PartitionIndex> {
        self.managers.keys().copied().collect()
    }

    /// Point-in-time copy of every registered handle, ordered by partition index.
    pub fn snapshot(&self) -> Vec<Arc<HandleOf<F>>> {
        let mut entries: Vec<_> = self.managers.iter().collect();
        entries.sort_by_key(|(index, _)| **index);
        entries
            .into_iter()
            .map(|(_, handle)| Arc::clone(handle))
            .collect()
    }

    /// Copy of the index to handle mapping.
    pub fn lookup_table(&self) -> HashMap<PartitionIndex, Arc<HandleOf<F>>> {
        self.managers.clone()
    }

    pub fn get(&self, partition: PartitionIndex) -> Option<Arc<HandleOf<F>>> {
        self.managers.get(&partition).cloned()
    }

    /// Open a manager for `partition` and register it.
    ///
    /// Registering a partition twice without an intervening removal is a
    /// programming error and fails with [`CoordinatorError::DuplicateManager`].
    pub async fn insert(&mut self, partition: &Partition) -> CoordinatorResult<Arc<HandleOf<F>>> {
        if self.contains(partition.index) {
            return Err(CoordinatorError::DuplicateManager(partition.index));
        }

        let handle = Arc::new(self.factory.open(partition, &self.ctx).await?);
        self.managers.insert(partition.index, Arc::clone(&handle));
        debug!(
            topic = %self.ctx.topic,
            partition = %partition.index,
            broker = %partition.broker,
            "Opened partition manager"
        );
        Ok(handle)
    }

    /// Remove the manager for `partition` and close it.
    ///
    /// Returns `Ok(false)` if nothing was registered. A close failure is
    /// returned to the caller, but the entry is gone either way.
    pub async fn remove_and_close(&mut self, partition: PartitionIndex) -> CoordinatorResult<bool> {
        let Some(handle) = self.managers.remove(&partition) else {
            return Ok(false);
        };
        handle.close().await?;
        debug!(topic = %self.ctx.topic, %partition, "Closed partition manager");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::mock::{MockConnections, MockManagerFactory, MockStateStore};
    use crate::types::BrokerEndpoint;

    fn partition(index: i32) -> Partition {
        Partition::new(index, BrokerEndpoint::new("broker-0", 9092))
    }

    fn registry() -> (
        PartitionManagerRegistry<MockManagerFactory>,
        Arc<MockManagerFactory>,
    ) {
        let factory = Arc::new(MockManagerFactory::new());
        let ctx = ManagerContext::new(
            "clicks",
            "gen-1",
            Arc::new(MockStateStore::new()),
            Arc::new(MockConnections::new()),
        );
        (PartitionManagerRegistry::new(factory.clone(), ctx), factory)
    }

    #[tokio::test]
    async fn test_new_registry_is_empty() {
        let (registry, _) = registry();
        assert!(registry.is_empty());
        assert!(registry.keys().is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_insert_opens_and_registers() {
        let (mut registry, factory) = registry();
        let handle = registry.insert(&partition(3)).await.unwrap();

        assert_eq!(handle.partition().index, PartitionIndex(3));
        assert!(registry.contains(PartitionIndex(3)));
        assert_eq!(factory.opened(), vec![PartitionIndex(3)]);
        assert!(Arc::ptr_eq(
            &handle,
            &registry.get(PartitionIndex(3)).unwrap()
        ));
    }

    #[tokio::test]
    async fn test_insert_passes_context_to_factory() {
        let (mut registry, _) = registry();
        let handle = registry.insert(&partition(0)).await.unwrap();
        assert_eq!(handle.topic(), "clicks");
        assert_eq!(handle.generation_id(), "gen-1");
    }

    #[tokio::test]
    async fn test_insert_twice_is_rejected() {
        let (mut registry, factory) = registry();
        registry.insert(&partition(1)).await.unwrap();

        let err = registry.insert(&partition(1)).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::DuplicateManager(PartitionIndex(1))));
        assert_eq!(factory.open_count(), 1);
    }

    #[tokio::test]
    async fn test_insert_open_failure_leaves_registry_untouched() {
        let (mut registry, factory) = registry();
        factory.fail_open_for(PartitionIndex(2));

        let err = registry.insert(&partition(2)).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::ManagerOpen { .. }));
        assert!(!registry.contains(PartitionIndex(2)));
    }

    #[tokio::test]
    async fn test_remove_and_close() {
        let (mut registry, factory) = registry();
        let handle = registry.insert(&partition(5)).await.unwrap();

        assert!(registry.remove_and_close(PartitionIndex(5)).await.unwrap());
        assert!(handle.is_closed());
        assert!(registry.is_empty());
        assert_eq!(factory.closed(), vec![PartitionIndex(5)]);
    }

    #[tokio::test]
    async fn test_remove_missing_is_noop() {
        let (mut registry, factory) = registry();
        assert!(!registry.remove_and_close(PartitionIndex(9)).await.unwrap());
        assert_eq!(factory.close_count(), 0);
    }

    #[tokio::test]
    async fn test_close_failure_propagates_but_frees_slot() {
        let (mut registry, factory) = registry();
        registry.insert(&partition(4)).await.unwrap();
        factory.fail_close_for(PartitionIndex(4));

        let err = registry.remove_and_close(PartitionIndex(4)).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::ManagerClose { .. }));
        assert!(!registry.contains(PartitionIndex(4)));
    }

    #[tokio::test]
    async fn test_snapshot_is_sorted_copy() {
        let (mut registry, _) = registry();
        for index in [6, 0, 3] {
            registry.insert(&partition(index)).await.unwrap();
        }

        let snapshot = registry.snapshot();
        let order: Vec<i32> = snapshot.iter().map(|h| h.partition().index.0).collect();
        assert_eq!(order, vec![0, 3, 6]);

        registry.remove_and_close(PartitionIndex(3)).await.unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_keys_are_ordered() {
        let (mut registry, _) = registry();
        for index in [8, 2, 5] {
            registry.insert(&partition(index)).await.unwrap();
        }
        let keys: Vec<_> = registry.keys().into_iter().collect();
        assert_eq!(keys, vec![PartitionIndex(2), PartitionIndex(5), PartitionIndex(8)]);
        assert_eq!(registry.lookup_table().len(), 3);
    }
}
