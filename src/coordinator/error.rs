//! Error types for the partition coordinator.
//!
//! # Error Classes
//!
//! Every failure the coordinator can observe falls into one of three classes:
//!
//! ## Transient (catch, reconnect, defer)
//!
//! I/O failures talking to the metadata source: timeouts, refused
//! connections, resets and any other I/O fault. The refresh in flight is
//! abandoned without touching the registry or the refresh cache, the
//! metadata connection is recreated, and the next call to
//! `managed_partitions()` retries. See [`CoordinatorError::is_transient`].
//!
//! ## Configuration (fail fast at construction)
//!
//! Invalid construction parameters such as a non-positive task count. These
//! are reported by [`CoordinatorConfig::validate`] or
//! [`TaskAssignment::new`] and never surface during a refresh.
//!
//! ## Fatal (propagate)
//!
//! Everything else: malformed metadata, a manager that fails to open, a
//! registry invariant violation. These propagate to the caller so the task
//! crashes and is restarted by its supervisor instead of running with an
//! undefined partition set.
//!
//! Close failures are the one exception to "fatal unless transient": one
//! partition failing to release must not block reassignment of the others,
//! so the coordinator logs them and reports them in the refresh outcome.
//!
//! [`CoordinatorConfig::validate`]: super::CoordinatorConfig::validate
//! [`TaskAssignment::new`]: super::TaskAssignment::new

use std::io;

use thiserror::Error;

use crate::types::PartitionIndex;

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors that can occur while coordinating partition ownership.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Network-level failure contacting the metadata source.
    #[error("Metadata source unreachable ({kind:?}): {message}")]
    Connectivity { kind: io::ErrorKind, message: String },

    /// Invalid construction parameters.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The metadata source returned a partition map that cannot be trusted.
    #[error("Malformed metadata for topic {topic}: {message}")]
    Metadata { topic: String, message: String },

    /// A partition manager could not be constructed.
    #[error("Failed to open manager for partition {partition}: {message}")]
    ManagerOpen {
        partition: PartitionIndex,
        message: String,
    },

    /// A partition manager failed to release its resources.
    #[error("Failed to close manager for partition {partition}: {message}")]
    ManagerClose {
        partition: PartitionIndex,
        message: String,
    },

    /// A manager was registered twice for the same partition.
    #[error("Manager for partition {0} is already registered")]
    DuplicateManager(PartitionIndex),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Programming error or unexpected state.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Shorthand for a connectivity error.
    pub fn connectivity(kind: io::ErrorKind, message: impl Into<String>) -> Self {
        CoordinatorError::Connectivity {
            kind,
            message: message.into(),
        }
    }

    /// Check if this error is a transient connectivity failure.
    ///
    /// Transient errors are the only ones the refresh path recovers from.
    /// Every I/O failure counts, whatever its kind: the metadata client's
    /// session is recreated and the refresh is retried on the next call.
    #[inline]
    pub fn is_transient(&self) -> bool {
        match self {
            CoordinatorError::Connectivity { .. } => true,
            CoordinatorError::Io(_) => true,

            CoordinatorError::Config(_) => false,
            CoordinatorError::Metadata { .. } => false,
            CoordinatorError::ManagerOpen { .. } => false,
            CoordinatorError::ManagerClose { .. } => false,
            CoordinatorError::DuplicateManager(_) => false,
            CoordinatorError::Serde(_) => false,
            CoordinatorError::Internal(_) => false,
        }
    }

    /// Check if this error is fatal for the consumption task.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }

    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, CoordinatorError::Config(_))
    }

    /// Returns a string label for metrics.
    pub fn as_metric_label(&self) -> &'static str {
        match self {
            CoordinatorError::Connectivity { .. } => "connectivity",
            CoordinatorError::Config(_) => "config",
            CoordinatorError::Metadata { .. } => "metadata",
            CoordinatorError::ManagerOpen { .. } => "manager_open",
            CoordinatorError::ManagerClose { .. } => "manager_close",
            CoordinatorError::DuplicateManager(_) => "duplicate_manager",
            CoordinatorError::Serde(_) => "serde",
            CoordinatorError::Io(_) => "io",
            CoordinatorError::Internal(_) => "internal",
        }
    }
}
