//! Partition identity and the per-fetch global partition map.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::error::{CoordinatorError, CoordinatorResult};
use crate::types::{BrokerEndpoint, PartitionIndex};

/// One shard of the topic together with the broker currently serving it.
///
/// Equality and hashing consider the index only: a partition whose leader
/// moves to another broker is still the same partition for ownership
/// purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub index: PartitionIndex,
    pub broker: BrokerEndpoint,
}

impl Partition {
    pub fn new(index: impl Into<PartitionIndex>, broker: BrokerEndpoint) -> Self {
        Self {
            index: index.into(),
            broker,
        }
    }

    /// Stable string id (`partition_<index>`).
    pub fn id(&self) -> String {
        self.index.id()
    }
}

impl PartialEq for Partition {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for Partition {}

impl Hash for Partition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

/// Every partition of the topic, as returned by one metadata fetch.
///
/// Built through [`GlobalPartitionMap::new`], which rejects negative and
/// duplicate indices. Partitions are kept sorted by index.
#[derive(Debug, Clone, Default)]
pub struct GlobalPartitionMap {
    partitions: Vec<Partition>,
}

impl GlobalPartitionMap {
    /// Validate and build a partition map for `topic`.
    ///
    /// Malformed input is a fatal [`CoordinatorError::Metadata`] error.
    pub fn new(topic: &str, partitions: Vec<Partition>) -> CoordinatorResult<Self> {
        let mut seen = HashSet::with_capacity(partitions.len());
        for partition in &partitions {
            if !partition.index.is_valid() {
                return Err(CoordinatorError::Metadata {
                    topic: topic.to_string(),
                    message: format!("negative partition index {}", partition.index),
                });
            }
            if !seen.insert(partition.index) {
                return Err(CoordinatorError::Metadata {
                    topic: topic.to_string(),
                    message: format!("duplicate partition index {}", partition.index),
                });
            }
        }

        let mut partitions = partitions;
        partitions.sort_by_key(|p| p.index);
        Ok(Self { partitions })
    }

    /// Build a map from `(index, broker)` pairs.
    pub fn from_pairs(
        topic: &str,
        pairs: impl IntoIterator<Item = (i32, BrokerEndpoint)>,
    ) -> CoordinatorResult<Self> {
        let partitions = pairs
            .into_iter()
            .map(|(index, broker)| Partition::new(index, broker))
            .collect();
        Self::new(topic, partitions)
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter()
    }

    pub fn get(&self, index: PartitionIndex) -> Option<&Partition> {
        self.partitions
            .binary_search_by_key(&index, |p| p.index)
            .ok()
            .map(|pos| &self.partitions[pos])
    }
}

impl IntoIterator for GlobalPartitionMap {
    type Item = Partition;
    type IntoIter = std::vec::IntoIter<Partition>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker(n: u16) -> BrokerEndpoint {
        BrokerEndpoint::new(format!("broker-{}", n), 9092)
    }

    #[test]
    fn test_partition_equality_ignores_broker() {
        let a = Partition::new(3, broker(1));
        let b = Partition::new(3, broker(2));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn test_partition_id() {
        assert_eq!(Partition::new(11, broker(0)).id(), "partition_11");
    }

    #[test]
    fn test_map_is_sorted_by_index() {
        let map = GlobalPartitionMap::from_pairs(
            "t",
            vec![(2, broker(0)), (0, broker(1)), (1, broker(2))],
        )
        .unwrap();
        let indices: Vec<i32> = map.iter().map(|p| p.index.value()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_map_rejects_duplicates() {
        let err = GlobalPartitionMap::from_pairs("orders", vec![(1, broker(0)), (1, broker(1))])
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Metadata { .. }));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("duplicate partition index 1"));
    }

    #[test]
    fn test_map_rejects_negative_index() {
        let err = GlobalPartitionMap::from_pairs("orders", vec![(-1, broker(0))]).unwrap_err();
        assert!(err.to_string().contains("negative partition index -1"));
    }

    #[test]
    fn test_map_get() {
        let map =
            GlobalPartitionMap::from_pairs("t", vec![(0, broker(0)), (5, broker(5))]).unwrap();
        assert_eq!(map.get(PartitionIndex(5)).unwrap().broker, broker(5));
        assert!(map.get(PartitionIndex(3)).is_none());
        assert_eq!(map.len(), 2);
        assert!(!map.is_empty());
    }

    #[test]
    fn test_empty_map() {
        let map = GlobalPartitionMap::new("t", Vec::new()).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.into_iter().count(), 0);
    }
}
