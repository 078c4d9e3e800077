//! Ingress events consumed by the controller event loop.
//!
//! Every input to the deletion subsystem arrives as a `ControllerEvent`
//! enqueued on the controller's single event channel: durable-store watch
//! firings, broker responses, liveness changes, and resignation. The channel
//! provides the total order the coordinator relies on; no callback types
//! cross module boundaries.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{BrokerId, ControllerEpoch, TopicPartition};

/// Per-partition outcome inside a stop-replica response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopReplicaPartitionResult {
    pub partition: TopicPartition,
    /// `None` on success, `Some(reason)` when the broker failed to stop or
    /// delete the replica.
    pub error: Option<String>,
}

impl StopReplicaPartitionResult {
    /// A successful per-partition result.
    pub fn ok(partition: TopicPartition) -> Self {
        Self {
            partition,
            error: None,
        }
    }

    /// A failed per-partition result.
    pub fn failed(partition: TopicPartition, reason: impl Into<String>) -> Self {
        Self {
            partition,
            error: Some(reason.into()),
        }
    }

    /// Whether this partition's replica was stopped successfully.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A broker's response to a `StopReplica(delete = true)` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopReplicaResponse {
    pub partitions: Vec<StopReplicaPartitionResult>,
}

/// An input to the controller event loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControllerEvent {
    /// The deletion-intent watch fired with a new set of children.
    DeleteTopicsChildChange { topics: Vec<Arc<str>> },

    /// A broker answered a `StopReplica(delete = true)` request.
    ///
    /// The epoch is the one the request was stamped with; the event loop
    /// discards responses from a previous controller generation.
    StopReplicaResponseReceived {
        broker_id: BrokerId,
        epoch: ControllerEpoch,
        response: StopReplicaResponse,
    },

    /// A broker joined the cluster or restarted.
    BrokerStartup { broker_id: BrokerId },

    /// The failure detector declared a broker dead.
    BrokerFailure { broker_id: BrokerId },

    /// A partition reassignment finished, possibly unblocking a deletion.
    PartitionReassignmentComplete { partition: TopicPartition },

    /// This node lost the controller election.
    ControllerResignation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_result_classification() {
        let ok = StopReplicaPartitionResult::ok(TopicPartition::new("a", 0));
        assert!(ok.is_ok());

        let failed =
            StopReplicaPartitionResult::failed(TopicPartition::new("a", 1), "log dir offline");
        assert!(!failed.is_ok());
        assert_eq!(failed.error.as_deref(), Some("log dir offline"));
    }
}
