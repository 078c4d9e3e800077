//! Type-safe wrappers for controller primitives.
//!
//! These newtypes prevent mixing up different integer types that share an
//! underlying representation but carry different semantic meanings, and give
//! the composite identifiers (`TopicPartition`, `PartitionReplica`) a single
//! canonical definition used across the projections, the dispatcher, and the
//! deletion coordinator.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A broker identifier.
///
/// Broker IDs are 32-bit signed integers that uniquely identify broker nodes
/// within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BrokerId(pub i32);

impl BrokerId {
    /// Sentinel meaning "no leader is available" for a partition.
    pub const NO_LEADER: Self = BrokerId(-1);

    /// Sentinel leader id broadcast to brokers while a topic is being
    /// deleted, so they reject client traffic for its partitions.
    pub const LEADER_DURING_DELETE: Self = BrokerId(-2);

    /// Create a new broker ID from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        BrokerId(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Check if this is a valid (non-negative) broker ID.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i32> for BrokerId {
    fn from(value: i32) -> Self {
        BrokerId(value)
    }
}

impl From<BrokerId> for i32 {
    fn from(id: BrokerId) -> Self {
        id.0
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The controller generation counter.
///
/// Bumped every time a node wins the controller election. Outbound requests
/// are stamped with the epoch they were issued under, and response events
/// carrying a stale epoch are discarded by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ControllerEpoch(pub u64);

impl ControllerEpoch {
    /// Epoch value before the first election.
    pub const INITIAL: Self = ControllerEpoch(0);

    /// Create an epoch from a raw value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        ControllerEpoch(value)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The epoch following this one.
    #[inline]
    pub const fn next(self) -> Self {
        ControllerEpoch(self.0 + 1)
    }
}

impl fmt::Display for ControllerEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One partition of one topic.
///
/// Topic names are held as `Arc<str>` so the id clones in O(1); partition
/// ids are cloned on every transition, request grouping, and queue lookup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: Arc<str>,
    pub partition: i32,
}

impl TopicPartition {
    /// Create a new topic-partition id.
    pub fn new(topic: impl Into<Arc<str>>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// One replica of one partition, hosted on one broker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionReplica {
    pub partition: TopicPartition,
    pub broker_id: BrokerId,
}

impl PartitionReplica {
    /// Create a new replica id.
    pub fn new(partition: TopicPartition, broker_id: BrokerId) -> Self {
        Self {
            partition,
            broker_id,
        }
    }

    /// The topic this replica belongs to.
    pub fn topic(&self) -> &Arc<str> {
        &self.partition.topic
    }
}

impl fmt::Display for PartitionReplica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.partition, self.broker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_id_sentinels() {
        assert!(!BrokerId::NO_LEADER.is_valid());
        assert!(!BrokerId::LEADER_DURING_DELETE.is_valid());
        assert!(BrokerId::new(0).is_valid());
        assert_ne!(BrokerId::NO_LEADER, BrokerId::LEADER_DURING_DELETE);
    }

    #[test]
    fn test_epoch_next() {
        let epoch = ControllerEpoch::INITIAL;
        assert_eq!(epoch.next().value(), 1);
        assert!(epoch.next() > epoch);
    }

    #[test]
    fn test_display_formats() {
        let tp = TopicPartition::new("orders", 3);
        assert_eq!(tp.to_string(), "orders-3");

        let replica = PartitionReplica::new(tp, BrokerId::new(7));
        assert_eq!(replica.to_string(), "orders-3-7");
        assert_eq!(replica.topic().as_ref(), "orders");
    }

    #[test]
    fn test_topic_partition_ordering() {
        let a0 = TopicPartition::new("a", 0);
        let a1 = TopicPartition::new("a", 1);
        let b0 = TopicPartition::new("b", 0);
        assert!(a0 < a1);
        assert!(a1 < b0);
    }
}
