//! Refresh, ownership and reconciliation of partition managers.
//!
//! # Refresh Cycle
//!
//! ```text
//!   managed_partitions()
//!          │
//!          ▼
//!   cache fresh? ──yes──► return published snapshot (no I/O)
//!          │ no
//!          ▼
//!   fetch GlobalPartitionMap ──transient──► reconnect, keep state, return old snapshot
//!          │                 ──other──────► propagate (task crashes, supervisor restarts)
//!          ▼
//!   desired = { p | owns(p) }     current = registry.keys()
//!          │
//!          ▼
//!   close (current − desired), open (desired − current)
//!          │
//!          ▼
//!   publish snapshot, mark cache fresh
//! ```
//!
//! Partitions in both `current` and `desired` are never touched: their
//! handles keep whatever consumption progress they hold.
//!
//! # Concurrency
//!
//! Published state (snapshot, lookup table, refresh cache) lives behind a
//! read-write lock that readers hold only long enough to clone an `Arc`.
//! Refresh cycles are serialized by a separate mutex that guards the
//! authoritative registry and the metadata connection, held across the
//! metadata fetch. Readers of fresh data never wait on it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::config::CoordinatorConfig;
use super::error::{CoordinatorError, CoordinatorResult};
use super::metrics;
use super::ownership::TaskAssignment;
use super::partition::{GlobalPartitionMap, Partition};
use super::refresh_cache::{Clock, RefreshCache, SystemClock};
use super::registry::{HandleOf, PartitionManagerRegistry};
use super::traits::{
    BrokerMetadataSource, ManagerContext, ManagerHandle, MetadataConnector,
    PartitionConnections, PartitionManagerFactory, StateStore,
};
use crate::types::PartitionIndex;

/// Immutable, point-in-time list of managed partitions ordered by index.
pub type ManagedPartitions<H> = Arc<[Arc<H>]>;

/// Partitions whose manager failed to close, with the error it returned.
pub type CloseFailures = Vec<(PartitionIndex, CoordinatorError)>;

/// Ownership changes applied by one refresh.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Newly owned partitions, ascending.
    pub added: Vec<PartitionIndex>,
    /// Partitions no longer owned, ascending.
    pub removed: Vec<PartitionIndex>,
    /// Removed partitions whose manager failed to close. They are gone from
    /// the registry regardless.
    pub close_failures: CloseFailures,
}

impl ReconcileReport {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Result of one refresh attempt.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Metadata was fetched and the registry now matches the owned set.
    Reconciled(ReconcileReport),
    /// The metadata source was unreachable. Nothing changed and the cache
    /// stays stale, so the next call retries.
    Deferred { error: CoordinatorError },
}

impl RefreshOutcome {
    pub fn is_reconciled(&self) -> bool {
        matches!(self, RefreshOutcome::Reconciled(_))
    }

    pub fn report(&self) -> Option<&ReconcileReport> {
        match self {
            RefreshOutcome::Reconciled(report) => Some(report),
            RefreshOutcome::Deferred { .. } => None,
        }
    }
}

/// State touched only while holding the refresh lock.
struct RefreshState<S, F: PartitionManagerFactory> {
    source: Option<S>,
    registry: PartitionManagerRegistry<F>,
}

/// State visible to readers.
struct Published<H> {
    cache: RefreshCache,
    snapshot: ManagedPartitions<H>,
    lookup: HashMap<PartitionIndex, Arc<H>>,
}

/// Decides which partitions this task reads and keeps one manager open per
/// owned partition.
pub struct PartitionCoordinator<M, F, K = SystemClock>
where
    M: MetadataConnector,
    F: PartitionManagerFactory,
    K: Clock,
{
    config: CoordinatorConfig,
    assignment: TaskAssignment,
    topic: Arc<str>,
    connector: M,
    clock: K,
    refresh_state: Mutex<RefreshState<M::Source, F>>,
    published: RwLock<Published<HandleOf<F>>>,
}

impl<M, F> PartitionCoordinator<M, F, SystemClock>
where
    M: MetadataConnector,
    F: PartitionManagerFactory,
{
    /// Create a coordinator using the system clock.
    ///
    /// Fails with [`CoordinatorError::Config`] if `config` is invalid. No I/O
    /// happens here; the metadata source is connected on the first refresh.
    pub fn new(
        config: CoordinatorConfig,
        connector: M,
        factory: Arc<F>,
        state_store: Arc<dyn StateStore>,
        connections: Arc<dyn PartitionConnections>,
    ) -> CoordinatorResult<Self> {
        Self::with_clock(
            config,
            connector,
            factory,
            state_store,
            connections,
            SystemClock,
        )
    }
}

impl<M, F, K> PartitionCoordinator<M, F, K>
where
    M: MetadataConnector,
    F: PartitionManagerFactory,
    K: Clock,
{
    /// Create a coordinator with an explicit clock.
    pub fn with_clock(
        config: CoordinatorConfig,
        connector: M,
        factory: Arc<F>,
        state_store: Arc<dyn StateStore>,
        connections: Arc<dyn PartitionConnections>,
        clock: K,
    ) -> CoordinatorResult<Self> {
        let config = config.validated()?;
        let assignment = config.assignment()?;
        let topic: Arc<str> = Arc::from(config.topic.as_str());

        let ctx = ManagerContext::new(
            Arc::clone(&topic),
            config.generation_id.as_str(),
            state_store,
            connections,
        );

        info!(
            topic = %topic,
            task_index = assignment.task_index(),
            total_tasks = assignment.total_tasks(),
            refresh_freq_secs = config.refresh_freq_secs,
            "Partition coordinator created"
        );

        Ok(Self {
            refresh_state: Mutex::new(RefreshState {
                source: None,
                registry: PartitionManagerRegistry::new(factory, ctx),
            }),
            published: RwLock::new(Published {
                cache: RefreshCache::new(config.refresh_ttl()),
                snapshot: Arc::from(Vec::new()),
                lookup: HashMap::new(),
            }),
            config,
            assignment,
            topic,
            connector,
            clock,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn assignment(&self) -> TaskAssignment {
        self.assignment
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    // ========================================================================
    // Read Path
    // ========================================================================

    /// Managers for every partition this task currently owns.
    ///
    /// Returns the published snapshot without I/O while the cache is fresh.
    /// Otherwise refreshes first. If the metadata source is unreachable the
    /// previous snapshot (empty before the first success) is returned and the
    /// next call tries again. Any other failure propagates.
    pub async fn managed_partitions(&self) -> CoordinatorResult<ManagedPartitions<HandleOf<F>>> {
        if let Some(snapshot) = self.fresh_snapshot().await {
            return Ok(snapshot);
        }

        let mut state = self.refresh_state.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(snapshot) = self.fresh_snapshot().await {
            return Ok(snapshot);
        }

        self.refresh_locked(&mut state).await?;
        Ok(Arc::clone(&self.published.read().await.snapshot))
    }

    /// Manager for `partition` as of the last refresh. Never triggers one.
    pub async fn get_manager(&self, partition: PartitionIndex) -> Option<Arc<HandleOf<F>>> {
        self.published.read().await.lookup.get(&partition).cloned()
    }

    /// Number of managers as of the last refresh.
    pub async fn managed_partition_count(&self) -> usize {
        self.published.read().await.snapshot.len()
    }

    /// Whether the next [`managed_partitions`](Self::managed_partitions) call
    /// would be served without a refresh.
    pub async fn is_fresh(&self) -> bool {
        self.fresh_snapshot().await.is_some()
    }

    /// Force the next [`managed_partitions`](Self::managed_partitions) call to refresh.
    pub async fn invalidate(&self) {
        self.published.write().await.cache.invalidate();
    }

    async fn fresh_snapshot(&self) -> Option<ManagedPartitions<HandleOf<F>>> {
        let published = self.published.read().await;
        if published.cache.should_refresh(self.clock.now()) {
            None
        } else {
            Some(Arc::clone(&published.snapshot))
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Run one refresh cycle regardless of cache state.
    pub async fn refresh(&self) -> CoordinatorResult<RefreshOutcome> {
        let mut state = self.refresh_state.lock().await;
        self.refresh_locked(&mut state).await
    }

    async fn refresh_locked(
        &self,
        state: &mut RefreshState<M::Source, F>,
    ) -> CoordinatorResult<RefreshOutcome> {
        info!(topic = %self.topic, task = %self.assignment, "Refreshing partition manager connections");

        let source = match state.source.take() {
            Some(source) => source,
            None => match self.connect().await {
                Ok(source) => source,
                Err(e) => return self.abandon_refresh(e),
            },
        };

        let started = Instant::now();
        let fetched = source.fetch().await;
        metrics::record_metadata_fetch(
            if fetched.is_ok() { "success" } else { "error" },
            started.elapsed().as_secs_f64(),
        );

        let map = match fetched {
            Ok(map) => {
                state.source = Some(source);
                map
            }
            Err(e) if e.is_transient() => {
                warn!(topic = %self.topic, error = %e, "Metadata source error, recreating connection");
                drop(source);
                match self.reconnect().await {
                    Ok(source) => state.source = source,
                    Err(fatal) => return self.abandon_refresh(fatal),
                }
                return self.abandon_refresh(e);
            }
            Err(e) => {
                state.source = Some(source);
                return self.abandon_refresh(e);
            }
        };

        let reconciled = self.reconcile(&mut state.registry, map).await;
        match reconciled {
            Ok(report) => {
                self.publish(&state.registry, Some(self.clock.now())).await;
                metrics::record_refresh(&self.topic, "reconciled");
                info!(topic = %self.topic, managed = state.registry.len(), "Finished refreshing");
                Ok(RefreshOutcome::Reconciled(report))
            }
            Err(e) => {
                // Keep readers off handles that were closed before the failure.
                self.publish(&state.registry, None).await;
                self.abandon_refresh(e)
            }
        }
    }

    /// Compute the owned set from `map` and bring the registry in line with it.
    async fn reconcile(
        &self,
        registry: &mut PartitionManagerRegistry<F>,
        map: GlobalPartitionMap,
    ) -> CoordinatorResult<ReconcileReport> {
        let desired: BTreeMap<PartitionIndex, Partition> = map
            .into_iter()
            .filter(|p| self.assignment.owns(p.index))
            .map(|p| (p.index, p))
            .collect();
        let current = registry.keys();

        let added: Vec<PartitionIndex> = desired
            .keys()
            .filter(|index| !current.contains(index))
            .copied()
            .collect();
        let removed: Vec<PartitionIndex> = current
            .iter()
            .filter(|index| !desired.contains_key(index))
            .copied()
            .collect();

        for (index, partition) in &desired {
            if let Some(handle) = registry.get(*index) {
                if handle.partition().broker != partition.broker {
                    debug!(
                        topic = %self.topic,
                        partition = %index,
                        from = %handle.partition().broker,
                        to = %partition.broker,
                        "Partition moved to another broker, keeping existing manager"
                    );
                }
            }
        }

        info!(topic = %self.topic, removed = %display_indices(&removed), "Deleted partition managers");
        let mut close_failures = Vec::new();
        for index in &removed {
            if let Err(e) = registry.remove_and_close(*index).await {
                error!(topic = %self.topic, partition = %index, error = %e, "Failed to close partition manager");
                metrics::record_close_failure(&self.topic);
                close_failures.push((*index, e));
            }
        }

        info!(topic = %self.topic, added = %display_indices(&added), "New partition managers");
        for index in &added {
            let partition = desired.get(index).ok_or_else(|| {
                CoordinatorError::Internal(format!("partition {} vanished from owned set", index))
            })?;
            registry.insert(partition).await?;
        }

        metrics::record_partition_changes(&self.topic, added.len(), removed.len());

        Ok(ReconcileReport {
            added,
            removed,
            close_failures,
        })
    }

    async fn connect(&self) -> CoordinatorResult<M::Source> {
        let result = self.connector.connect().await;
        metrics::record_connect(if result.is_ok() { "success" } else { "error" });
        result
    }

    /// Replace a broken metadata connection.
    ///
    /// A transient failure leaves no connection behind; the next refresh
    /// connects again before fetching.
    async fn reconnect(&self) -> CoordinatorResult<Option<M::Source>> {
        match self.connect().await {
            Ok(source) => {
                info!(topic = %self.topic, "Recreated metadata source connection");
                Ok(Some(source))
            }
            Err(e) if e.is_transient() => {
                warn!(topic = %self.topic, error = %e, "Failed to recreate metadata source connection");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Defer on transient errors, propagate everything else.
    fn abandon_refresh(&self, error: CoordinatorError) -> CoordinatorResult<RefreshOutcome> {
        if error.is_transient() {
            warn!(topic = %self.topic, error = %error, "Refresh deferred until next call");
            metrics::record_refresh(&self.topic, "deferred");
            Ok(RefreshOutcome::Deferred { error })
        } else {
            error!(
                topic = %self.topic,
                error = %error,
                kind = error.as_metric_label(),
                "Refresh failed"
            );
            metrics::record_refresh(&self.topic, "failed");
            Err(error)
        }
    }

    /// Expose the registry to readers. `None` leaves the cache stale.
    async fn publish(
        &self,
        registry: &PartitionManagerRegistry<F>,
        refreshed_at: Option<Instant>,
    ) {
        let snapshot: ManagedPartitions<HandleOf<F>> = registry.snapshot().into();
        let lookup = registry.lookup_table();

        let mut published = self.published.write().await;
        published.snapshot = snapshot;
        published.lookup = lookup;
        match refreshed_at {
            Some(at) => published.cache.mark_refreshed(at),
            None => published.cache.invalidate(),
        }
        metrics::set_managed_partitions(&self.topic, registry.len());
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Close every open manager and empty the registry.
    ///
    /// Close failures are logged and returned, never raised. The cache is
    /// invalidated, so a later [`managed_partitions`](Self::managed_partitions)
    /// call reopens owned partitions.
    pub async fn shutdown(&self) -> CloseFailures {
        let mut state = self.refresh_state.lock().await;
        let partitions = state.registry.keys();

        info!(topic = %self.topic, managers = partitions.len(), "Shutting down partition coordinator");

        let mut failures = Vec::new();
        for index in partitions {
            if let Err(e) = state.registry.remove_and_close(index).await {
                warn!(topic = %self.topic, partition = %index, error = %e, "Error closing partition manager during shutdown");
                metrics::record_close_failure(&self.topic);
                failures.push((index, e));
            }
        }
        state.source = None;

        self.publish(&state.registry, None).await;
        failures
    }
}

fn display_indices(indices: &[PartitionIndex]) -> String {
    let joined = indices
        .iter()
        .map(|index| index.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", joined)
}
