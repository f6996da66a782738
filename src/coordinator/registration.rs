//! Decoding of broker registration records from the metadata store.
//!
//! Brokers publish two kinds of JSON documents under the metadata root:
//!
//! ```text
//! <root>/ids/<broker_id>                                 {"host":"b1","port":9092,...}
//! <root>/topics/<topic>/partitions/<n>/state             {"leader":1,...}
//! ```
//!
//! A [`BrokerMetadataSource`](super::BrokerMetadataSource) implementation
//! reads those nodes and assembles a [`GlobalPartitionMap`] with
//! [`assemble_partition_map`]. Unknown fields are ignored.

use std::collections::HashMap;

use serde::Deserialize;

use super::error::{CoordinatorError, CoordinatorResult};
use super::partition::{GlobalPartitionMap, Partition};
use crate::types::BrokerEndpoint;

/// Contents of a `<root>/ids/<broker_id>` node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerRegistration {
    pub host: String,
    pub port: u16,
}

impl BrokerRegistration {
    pub fn from_json(bytes: &[u8]) -> CoordinatorResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn endpoint(&self) -> BrokerEndpoint {
        BrokerEndpoint::new(self.host.clone(), self.port)
    }
}

/// Contents of a `<root>/topics/<topic>/partitions/<n>/state` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PartitionLeader {
    pub leader: i32,
}

impl PartitionLeader {
    pub fn from_json(bytes: &[u8]) -> CoordinatorResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Join partition leaders with broker registrations.
///
/// A partition whose leader has no registration is malformed metadata and
/// fails the whole map.
pub fn assemble_partition_map(
    topic: &str,
    leaders: impl IntoIterator<Item = (i32, PartitionLeader)>,
    brokers: &HashMap<i32, BrokerRegistration>,
) -> CoordinatorResult<GlobalPartitionMap> {
    let mut partitions = Vec::new();
    for (index, state) in leaders {
        let broker = brokers
            .get(&state.leader)
            .ok_or_else(|| CoordinatorError::Metadata {
                topic: topic.to_string(),
                message: format!(
                    "partition {} led by unregistered broker {}",
                    index, state.leader
                ),
            })?;
        partitions.push(Partition::new(index, broker.endpoint()));
    }
    GlobalPartitionMap::new(topic, partitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PartitionIndex;

    fn brokers() -> HashMap<i32, BrokerRegistration> {
        HashMap::from([
            (
                1,
                BrokerRegistration::from_json(
                    br#"{"jmx_port":-1,"host":"b1.internal","version":1,"port":9092}"#,
                )
                .unwrap(),
            ),
            (
                2,
                BrokerRegistration::from_json(br#"{"host":"b2.internal","port":9093}"#).unwrap(),
            ),
        ])
    }

    #[test]
    fn test_broker_registration_ignores_extra_fields() {
        let brokers = brokers();
        assert_eq!(
            brokers[&1].endpoint(),
            BrokerEndpoint::new("b1.internal", 9092)
        );
    }

    #[test]
    fn test_bad_json_is_fatal_serde_error() {
        let err = BrokerRegistration::from_json(b"{\"host\":").unwrap_err();
        assert!(matches!(err, CoordinatorError::Serde(_)));
        assert!(err.is_fatal());

        let err = PartitionLeader::from_json(br#"{"leader":"one"}"#).unwrap_err();
        assert!(matches!(err, CoordinatorError::Serde(_)));
    }

    #[test]
    fn test_assemble_partition_map() {
        let leaders = [
            (1, PartitionLeader::from_json(br#"{"leader":2,"isr":[2,1]}"#).unwrap()),
            (0, PartitionLeader { leader: 1 }),
        ];
        let map = assemble_partition_map("clicks", leaders, &brokers()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get(PartitionIndex(1)).unwrap().broker,
            BrokerEndpoint::new("b2.internal", 9093)
        );
    }

    #[test]
    fn test_assemble_rejects_unknown_leader() {
        let err = assemble_partition_map("clicks", [(0, PartitionLeader { leader: 7 })], &brokers())
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Metadata { .. }));
        assert!(err.to_string().contains("unregistered broker 7"));
    }
}
