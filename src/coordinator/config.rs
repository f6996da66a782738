//! Configuration for a partition coordinator.
//!
//! A coordinator is configured once per consumption task. Its identity
//! (topic, task index, task count, generation id) is fixed for the lifetime
//! of the task; the refresh frequency bounds how stale the owned-partition
//! set may become.
//!
//! ```rust,no_run
//! use partwise::coordinator::CoordinatorConfig;
//!
//! let config = CoordinatorConfig {
//!     topic: "clicks".to_string(),
//!     task_index: 1,
//!     total_tasks: 3,
//!     generation_id: "topology-42".to_string(),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use super::error::{CoordinatorError, CoordinatorResult};
use super::ownership::TaskAssignment;
use crate::constants::{
    DEFAULT_METADATA_CONNECT, DEFAULT_METADATA_PATH, DEFAULT_REFRESH_FREQ_SECS,
    DEFAULT_TASK_INDEX, DEFAULT_TOTAL_TASKS, MAX_REFRESH_FREQ_SECS,
};

/// Where the broker metadata lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataStoreConfig {
    /// Connection string for the metadata store (`host:port[,host:port]`).
    pub connect_string: String,
    /// Root path under which brokers register topics and partitions.
    pub path: String,
}

impl Default for MetadataStoreConfig {
    fn default() -> Self {
        Self {
            connect_string: DEFAULT_METADATA_CONNECT.to_string(),
            path: DEFAULT_METADATA_PATH.to_string(),
        }
    }
}

/// Configuration consumed when constructing a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Topic this task consumes.
    pub topic: String,

    /// Metadata store location.
    pub metadata_store: MetadataStoreConfig,

    /// Index of this task among its peers, in `[0, total_tasks)`.
    pub task_index: i32,

    /// Number of cooperating tasks. Must be identical across all peers.
    pub total_tasks: i32,

    /// Unique per-deployment id handed to partition managers so that state
    /// from an earlier deployment can be told apart.
    pub generation_id: String,

    /// Seconds between metadata refreshes.
    pub refresh_freq_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            topic: String::new(),
            metadata_store: MetadataStoreConfig::default(),
            task_index: DEFAULT_TASK_INDEX,
            total_tasks: DEFAULT_TOTAL_TASKS,
            generation_id: String::new(),
            refresh_freq_secs: DEFAULT_REFRESH_FREQ_SECS,
        }
    }
}

impl CoordinatorConfig {
    /// TTL of the refresh cache.
    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_freq_secs)
    }

    /// Validated task assignment for this configuration.
    pub fn assignment(&self) -> CoordinatorResult<TaskAssignment> {
        TaskAssignment::new(self.task_index, self.total_tasks)
    }

    /// Validate the configuration and return every problem found.
    ///
    /// This should be called at startup to catch configuration issues early.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.topic.trim().is_empty() {
            errors.push("topic must not be empty".to_string());
        }

        if self.metadata_store.connect_string.trim().is_empty() {
            errors.push("metadata_store.connect_string must not be empty".to_string());
        }

        if !self.metadata_store.path.starts_with('/') {
            errors.push(format!(
                "metadata_store.path ({}) must be absolute",
                self.metadata_store.path
            ));
        }

        if self.total_tasks <= 0 {
            errors.push(format!(
                "total_tasks ({}) must be positive",
                self.total_tasks
            ));
        } else if self.task_index < 0 || self.task_index >= self.total_tasks {
            errors.push(format!(
                "task_index ({}) must be in [0, {})",
                self.task_index, self.total_tasks
            ));
        }

        if self.generation_id.trim().is_empty() {
            errors.push("generation_id must not be empty".to_string());
        }

        if self.refresh_freq_secs > MAX_REFRESH_FREQ_SECS {
            errors.push(format!(
                "refresh_freq_secs ({}) must not exceed {}",
                self.refresh_freq_secs, MAX_REFRESH_FREQ_SECS
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all problems into one [`CoordinatorError::Config`].
    pub fn validated(self) -> CoordinatorResult<Self> {
        self.validate()
            .map_err(|errors| CoordinatorError::Config(errors.join("; ")))?;
        Ok(self)
    }

    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TOPIC`: Topic to consume (required)
    /// - `METADATA_ZK_CONNECT`: Metadata store connection string (default: localhost:2181)
    /// - `METADATA_ZK_PATH`: Broker registration root (default: /brokers)
    /// - `TASK_INDEX`: Index of this task (default: 0)
    /// - `TOTAL_TASKS`: Number of cooperating tasks (default: 1)
    /// - `GENERATION_ID`: Unique per-deployment id (required)
    /// - `REFRESH_FREQ_SECS`: Seconds between metadata refreshes (default: 60)
    pub fn from_env() -> CoordinatorResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> CoordinatorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let topic = lookup("TOPIC")
            .ok_or_else(|| CoordinatorError::Config("TOPIC must be set".to_string()))?;

        let generation_id = lookup("GENERATION_ID")
            .ok_or_else(|| CoordinatorError::Config("GENERATION_ID must be set".to_string()))?;

        let connect_string = lookup("METADATA_ZK_CONNECT")
            .unwrap_or_else(|| defaults.metadata_store.connect_string.clone());

        let path =
            lookup("METADATA_ZK_PATH").unwrap_or_else(|| defaults.metadata_store.path.clone());

        let task_index = parse_var(&lookup, "TASK_INDEX", defaults.task_index)?;
        let total_tasks = parse_var(&lookup, "TOTAL_TASKS", defaults.total_tasks)?;
        let refresh_freq_secs =
            parse_var(&lookup, "REFRESH_FREQ_SECS", defaults.refresh_freq_secs)?;

        let config = CoordinatorConfig {
            topic,
            metadata_store: MetadataStoreConfig {
                connect_string,
                path,
            },
            task_index,
            total_tasks,
            generation_id,
            refresh_freq_secs,
        };

        config.validated()
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> CoordinatorResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CoordinatorError::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
