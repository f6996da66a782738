//! Centralized defaults for coordinator configuration.
//!
//! Keeping the defaults in one place lets [`CoordinatorConfig`] and
//! `CoordinatorConfig::from_env()` agree on them, and lets tests assert
//! against named values instead of magic numbers.
//!
//! [`CoordinatorConfig`]: crate::coordinator::CoordinatorConfig

// =============================================================================
// Refresh Cadence
// =============================================================================

/// Default interval between metadata refreshes, in seconds.
///
/// This bounds how stale the owned-partition set may become after the topic's
/// partition map changes (new partitions, broker moves).
pub const DEFAULT_REFRESH_FREQ_SECS: u64 = 60;

/// Upper bound accepted for the refresh frequency.
///
/// A day-long TTL effectively disables partition discovery; anything above it
/// is treated as a misconfiguration.
pub const MAX_REFRESH_FREQ_SECS: u64 = 24 * 60 * 60;

// =============================================================================
// Metadata Store
// =============================================================================

/// Default connection string for the metadata store.
pub const DEFAULT_METADATA_CONNECT: &str = "localhost:2181";

/// Default root path under which brokers register topics and partitions.
pub const DEFAULT_METADATA_PATH: &str = "/brokers";

// =============================================================================
// Task Identity
// =============================================================================

/// Default task index when running a single consumption task.
pub const DEFAULT_TASK_INDEX: i32 = 0;

/// Default number of cooperating consumption tasks.
pub const DEFAULT_TOTAL_TASKS: i32 = 1;

/// Prefix of the stable per-partition id (`partition_<index>`).
pub const PARTITION_ID_PREFIX: &str = "partition_";
