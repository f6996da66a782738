//! Integration tests for PartitionCoordinator.
//!
//! These tests drive several coordinators against one shared metadata store
//! and verify ownership coverage, handle stability across refreshes, and
//! behavior during metadata outages.

use partwise::coordinator::mock::{
    MockConnections, MockHandle, MockManagerFactory, MockMetadataConnector, MockStateStore,
};
use partwise::coordinator::{
    CoordinatorConfig, CoordinatorError, ManagerHandle, ManualClock, PartitionCoordinator,
    RefreshOutcome,
};
use partwise::types::PartitionIndex;
use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;

type Coordinator = PartitionCoordinator<MockMetadataConnector, MockManagerFactory, Arc<ManualClock>>;

fn config(task_index: i32, total_tasks: i32, generation_id: &str) -> CoordinatorConfig {
    CoordinatorConfig {
        topic: "page-views".to_string(),
        task_index,
        total_tasks,
        generation_id: generation_id.to_string(),
        refresh_freq_secs: 30,
        ..Default::default()
    }
}

fn build_task(
    task_index: i32,
    total_tasks: i32,
    metadata: &MockMetadataConnector,
    state_store: &Arc<MockStateStore>,
    clock: &Arc<ManualClock>,
) -> (Coordinator, Arc<MockManagerFactory>) {
    let factory = Arc::new(MockManagerFactory::new());
    let coordinator = PartitionCoordinator::with_clock(
        config(task_index, total_tasks, "gen-1"),
        metadata.clone(),
        factory.clone(),
        state_store.clone(),
        Arc::new(MockConnections::new()),
        clock.clone(),
    )
    .unwrap();
    (coordinator, factory)
}

fn owned(handles: &[Arc<MockHandle>]) -> BTreeSet<i32> {
    handles.iter().map(|h| h.partition().index.value()).collect()
}

async fn assert_exact_cover(coordinators: &[Coordinator], partition_count: i32) {
    let mut union = BTreeSet::new();
    for coordinator in coordinators {
        let managed = owned(&coordinator.managed_partitions().await.unwrap());
        for index in managed {
            assert!(union.insert(index), "partition {} owned twice", index);
        }
    }
    assert_eq!(union, (0..partition_count).collect::<BTreeSet<_>>());
}

// ============================================================================
// Ownership Across Tasks
// ============================================================================

#[tokio::test]
async fn test_tasks_partition_topic_exactly() {
    let metadata = MockMetadataConnector::with_partitions("page-views", 10);
    let store = Arc::new(MockStateStore::new());
    let clock = Arc::new(ManualClock::new());

    let coordinators: Vec<_> = (0..4)
        .map(|i| build_task(i, 4, &metadata, &store, &clock).0)
        .collect();

    assert_exact_cover(&coordinators, 10).await;
    let first = owned(&coordinators[0].managed_partitions().await.unwrap());
    assert_eq!(first, BTreeSet::from([0, 4, 8]));
}

#[tokio::test]
async fn test_tasks_follow_topic_growth_after_ttl() {
    let metadata = MockMetadataConnector::with_partitions("page-views", 7);
    let store = Arc::new(MockStateStore::new());
    let clock = Arc::new(ManualClock::new());

    let coordinators: Vec<_> = (0..3)
        .map(|i| build_task(i, 3, &metadata, &store, &clock).0)
        .collect();
    assert_exact_cover(&coordinators, 7).await;

    metadata.set_partition_count(9);

    // Still inside the TTL: nobody sees the new partitions yet.
    clock.advance(Duration::from_secs(30));
    let task_one = owned(&coordinators[1].managed_partitions().await.unwrap());
    assert_eq!(task_one, BTreeSet::from([1, 4]));

    clock.advance(Duration::from_secs(1));
    assert_exact_cover(&coordinators, 9).await;
    let task_one = owned(&coordinators[1].managed_partitions().await.unwrap());
    assert_eq!(task_one, BTreeSet::from([1, 4, 7]));
}

#[tokio::test]
async fn test_surviving_handles_are_reused() {
    let metadata = MockMetadataConnector::with_partitions("page-views", 6);
    let store = Arc::new(MockStateStore::new());
    let clock = Arc::new(ManualClock::new());
    let (coordinator, factory) = build_task(0, 2, &metadata, &store, &clock);

    let before = coordinator.managed_partitions().await.unwrap();
    metadata.set_partition_count(10);
    clock.advance(Duration::from_secs(31));
    let after = coordinator.managed_partitions().await.unwrap();

    assert_eq!(owned(&after), BTreeSet::from([0, 2, 4, 6, 8]));
    for old in before.iter() {
        let current = coordinator.get_manager(old.partition().index).await.unwrap();
        assert!(Arc::ptr_eq(old, &current));
        assert!(!old.is_closed());
    }
    assert_eq!(factory.open_count(), 5);
    assert_eq!(factory.close_count(), 0);
}

// ============================================================================
// Checkpoints
// ============================================================================

#[tokio::test]
async fn test_checkpoints_survive_generations() {
    let metadata = MockMetadataConnector::with_partitions("page-views", 3);
    let store = Arc::new(MockStateStore::new());
    let clock = Arc::new(ManualClock::new());

    let (first, _) = build_task(0, 1, &metadata, &store, &clock);
    let managed = first.managed_partitions().await.unwrap();
    assert!(managed.iter().all(|h| h.restored_checkpoint().is_none()));
    assert!(first.shutdown().await.is_empty());
    assert_eq!(store.get("/page-views/partition_2"), Some(b"gen-1".to_vec()));

    let second = PartitionCoordinator::with_clock(
        config(0, 1, "gen-2"),
        metadata.clone(),
        Arc::new(MockManagerFactory::new()),
        store.clone(),
        Arc::new(MockConnections::new()),
        clock.clone(),
    )
    .unwrap();
    let managed = second.managed_partitions().await.unwrap();
    for handle in managed.iter() {
        assert_eq!(handle.restored_checkpoint(), Some(&b"gen-1"[..]));
        assert_eq!(handle.generation_id(), "gen-2");
    }
}

// ============================================================================
// Metadata Outages
// ============================================================================

#[tokio::test]
async fn test_outage_serves_last_known_set() {
    let metadata = MockMetadataConnector::with_partitions("page-views", 4);
    let store = Arc::new(MockStateStore::new());
    let clock = Arc::new(ManualClock::new());
    let (coordinator, factory) = build_task(1, 2, &metadata, &store, &clock);

    let healthy = coordinator.managed_partitions().await.unwrap();
    assert_eq!(owned(&healthy), BTreeSet::from([1, 3]));

    for kind in [
        io::ErrorKind::ConnectionReset,
        io::ErrorKind::TimedOut,
        io::ErrorKind::BrokenPipe,
    ] {
        clock.advance(Duration::from_secs(31));
        metadata.fail_next_fetch_with(CoordinatorError::connectivity(kind, "session lost"));
        let during = coordinator.managed_partitions().await.unwrap();
        assert!(Arc::ptr_eq(&healthy, &during));
    }
    assert_eq!(factory.open_count(), 2);
    assert_eq!(factory.close_count(), 0);

    metadata.set_partition_count(6);
    let recovered = coordinator.managed_partitions().await.unwrap();
    assert_eq!(owned(&recovered), BTreeSet::from([1, 3, 5]));
}

#[tokio::test]
async fn test_explicit_refresh_reports_outage() {
    let metadata = MockMetadataConnector::with_partitions("page-views", 2);
    let store = Arc::new(MockStateStore::new());
    let clock = Arc::new(ManualClock::new());
    let (coordinator, _) = build_task(0, 1, &metadata, &store, &clock);

    metadata.fail_next_fetch_transient();
    let outcome = coordinator.refresh().await.unwrap();
    assert!(matches!(outcome, RefreshOutcome::Deferred { .. }));
    assert!(outcome.report().is_none());
    assert_eq!(coordinator.managed_partition_count().await, 0);

    let outcome = coordinator.refresh().await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.added, vec![PartitionIndex(0), PartitionIndex(1)]);
}

#[tokio::test]
async fn test_generic_io_error_defers_and_keeps_snapshot() {
    let metadata = MockMetadataConnector::with_partitions("page-views", 2);
    let store = Arc::new(MockStateStore::new());
    let clock = Arc::new(ManualClock::new());
    let (coordinator, factory) = build_task(0, 1, &metadata, &store, &clock);

    metadata.fail_next_fetch_with(CoordinatorError::from(io::Error::other(
        "zk client io failure",
    )));
    let during = coordinator.managed_partitions().await.unwrap();
    assert!(during.is_empty());
    assert!(!coordinator.is_fresh().await);

    let healthy = coordinator.managed_partitions().await.unwrap();
    assert_eq!(owned(&healthy), BTreeSet::from([0, 1]));

    clock.advance(Duration::from_secs(31));
    metadata.fail_next_fetch_with(CoordinatorError::from(io::Error::new(
        io::ErrorKind::PermissionDenied,
        "acl check failed",
    )));
    let during = coordinator.managed_partitions().await.unwrap();
    assert!(Arc::ptr_eq(&healthy, &during));
    assert_eq!(factory.open_count(), 2);
    assert_eq!(factory.close_count(), 0);
}

// ============================================================================
// Concurrent Readers
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_spawned_readers_share_one_refresh() {
    let metadata = MockMetadataConnector::with_partitions("page-views", 8);
    metadata.set_fetch_delay(Some(Duration::from_millis(250)));
    let store = Arc::new(MockStateStore::new());
    let clock = Arc::new(ManualClock::new());
    let (coordinator, factory) = build_task(0, 1, &metadata, &store, &clock);
    let coordinator = Arc::new(coordinator);

    let mut readers = Vec::new();
    for _ in 0..8 {
        let coordinator = Arc::clone(&coordinator);
        readers.push(tokio::spawn(async move {
            coordinator.managed_partitions().await.map(|m| m.len())
        }));
    }
    for reader in readers {
        assert_eq!(reader.await.unwrap().unwrap(), 8);
    }
    assert_eq!(metadata.fetch_count(), 1);
    assert_eq!(factory.open_count(), 8);
}
