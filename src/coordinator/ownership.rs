//! Static, negotiation-free partition ownership.
//!
//! Ownership is a pure function of the partition index, this task's index
//! and the total task count:
//!
//! ```text
//! owns(partition) := partition mod total_tasks == task_index
//! ```
//!
//! No state and no communication between tasks is involved. As long as every
//! task observes the same `total_tasks`, the owned sets of all tasks cover
//! every partition exactly once. Keeping `total_tasks` consistent across the
//! deployment is the supervisor's job, not this module's.

use std::fmt;

use super::error::{CoordinatorError, CoordinatorResult};
use crate::types::PartitionIndex;

/// Check whether `task_index` owns `partition` among `total_tasks` tasks.
///
/// Callers must guarantee `total_tasks > 0`; [`TaskAssignment`] validates
/// this once at construction so the hot path stays total.
#[inline]
pub fn owns(partition: PartitionIndex, task_index: i32, total_tasks: i32) -> bool {
    partition.value().rem_euclid(total_tasks) == task_index
}

/// Validated identity of one task among its statically indexed peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskAssignment {
    task_index: i32,
    total_tasks: i32,
}

impl TaskAssignment {
    /// Create an assignment, rejecting configurations that cannot own anything.
    pub fn new(task_index: i32, total_tasks: i32) -> CoordinatorResult<Self> {
        if total_tasks <= 0 {
            return Err(CoordinatorError::Config(format!(
                "total_tasks ({}) must be positive",
                total_tasks
            )));
        }
        if task_index < 0 || task_index >= total_tasks {
            return Err(CoordinatorError::Config(format!(
                "task_index ({}) must be in [0, {})",
                task_index, total_tasks
            )));
        }
        Ok(Self {
            task_index,
            total_tasks,
        })
    }

    pub fn task_index(&self) -> i32 {
        self.task_index
    }

    pub fn total_tasks(&self) -> i32 {
        self.total_tasks
    }

    /// Check whether this task owns `partition`.
    #[inline]
    pub fn owns(&self, partition: PartitionIndex) -> bool {
        owns(partition, self.task_index, self.total_tasks)
    }

    /// Filter `partitions` down to the ones this task owns.
    pub fn owned_indices<I>(&self, partitions: I) -> Vec<PartitionIndex>
    where
        I: IntoIterator<Item = PartitionIndex>,
    {
        partitions.into_iter().filter(|p| self.owns(*p)).collect()
    }
}

impl fmt::Display for TaskAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {}/{}", self.task_index, self.total_tasks)
    }
}
