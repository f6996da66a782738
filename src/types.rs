//! Type-safe wrappers for partition and broker primitives.
//!
//! These newtypes keep partition indices, task indices and broker addresses
//! from being mixed up even though several share the same representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::PARTITION_ID_PREFIX;

/// Topic-relative index of a partition.
///
/// Kafka partition indices are non-negative 32-bit integers. Negative values
/// only appear in malformed metadata and are rejected when a
/// [`GlobalPartitionMap`](crate::coordinator::GlobalPartitionMap) is built.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PartitionIndex(pub i32);

impl PartitionIndex {
    /// Create a partition index from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        PartitionIndex(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Check if this is a valid (non-negative) index.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Stable string id used by collaborators for checkpoint paths.
    pub fn id(self) -> String {
        format!("{}{}", PARTITION_ID_PREFIX, self.0)
    }
}

impl From<i32> for PartitionIndex {
    fn from(value: i32) -> Self {
        PartitionIndex(value)
    }
}

impl From<PartitionIndex> for i32 {
    fn from(index: PartitionIndex) -> Self {
        index.0
    }
}

impl fmt::Display for PartitionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network location of a log broker serving a partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for BrokerEndpoint {
    type Err = String;

    /// Parse a `host:port` pair. The last colon splits host and port so
    /// bracketless IPv6 hosts are not supported.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("broker endpoint '{}' is not host:port", s))?;
        if host.is_empty() {
            return Err(format!("broker endpoint '{}' has an empty host", s));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("broker endpoint '{}' has an invalid port: {}", s, e))?;
        Ok(BrokerEndpoint::new(host, port))
    }
}
