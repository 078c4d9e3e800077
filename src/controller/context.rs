//! Controller-owned view of cluster metadata.
//!
//! The context is the metadata cache the elected controller maintains: which
//! topics exist, how each topic's partitions are assigned to brokers, which
//! brokers are live, and the current controller epoch. It is exclusively
//! owned by the controller event task and only read or written there.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{BrokerId, ControllerEpoch, PartitionReplica, TopicPartition};

/// Replica assignment for one topic: partition index -> hosting brokers.
///
/// `BTreeMap` keeps partition iteration in index order, which makes request
/// grouping and teardown deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicAssignment {
    partitions: BTreeMap<i32, Vec<BrokerId>>,
}

impl TopicAssignment {
    /// Build an assignment from (partition, replicas) pairs.
    pub fn new(partitions: impl IntoIterator<Item = (i32, Vec<BrokerId>)>) -> Self {
        Self {
            partitions: partitions.into_iter().collect(),
        }
    }

    /// Partition indexes in ascending order.
    pub fn partition_indexes(&self) -> impl Iterator<Item = i32> + '_ {
        self.partitions.keys().copied()
    }

    /// Replicas hosting the given partition.
    pub fn replicas(&self, partition: i32) -> &[BrokerId] {
        self.partitions
            .get(&partition)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn remove_replica(&mut self, partition: i32, broker_id: BrokerId) {
        if let Some(replicas) = self.partitions.get_mut(&partition) {
            replicas.retain(|b| *b != broker_id);
        }
    }
}

/// The controller's in-memory cluster metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerContext {
    epoch: ControllerEpoch,
    topics: BTreeMap<Arc<str>, TopicAssignment>,
    live_brokers: BTreeSet<BrokerId>,
    shutting_down_brokers: BTreeSet<BrokerId>,
}

impl ControllerContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current controller epoch.
    pub fn epoch(&self) -> ControllerEpoch {
        self.epoch
    }

    /// Advance to the next controller epoch and return it.
    pub fn bump_epoch(&mut self) -> ControllerEpoch {
        self.epoch = self.epoch.next();
        self.epoch
    }

    // ========================================================================
    // Topic metadata
    // ========================================================================

    /// Record a topic and its replica assignment.
    pub fn add_topic(&mut self, topic: impl Into<Arc<str>>, assignment: TopicAssignment) {
        self.topics.insert(topic.into(), assignment);
    }

    /// Drop a topic from the cache.
    pub fn remove_topic(&mut self, topic: &str) {
        self.topics.remove(topic);
    }

    /// Whether the topic is present in the cache.
    pub fn contains_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// All cached topic names.
    pub fn all_topics(&self) -> Vec<Arc<str>> {
        self.topics.keys().cloned().collect()
    }

    /// All partitions of the given topic, in index order.
    pub fn partitions_for_topic(&self, topic: &str) -> Vec<TopicPartition> {
        match self.topics.get_key_value(topic) {
            Some((name, assignment)) => assignment
                .partition_indexes()
                .map(|p| TopicPartition {
                    topic: Arc::clone(name),
                    partition: p,
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// All replicas of the given partition.
    pub fn replicas_for_partition(&self, partition: &TopicPartition) -> Vec<PartitionReplica> {
        self.topics
            .get(partition.topic.as_ref())
            .map(|assignment| {
                assignment
                    .replicas(partition.partition)
                    .iter()
                    .map(|broker_id| PartitionReplica::new(partition.clone(), *broker_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All replicas of all partitions of the given topic.
    pub fn replicas_for_topic(&self, topic: &str) -> Vec<PartitionReplica> {
        self.partitions_for_topic(topic)
            .into_iter()
            .flat_map(|partition| self.replicas_for_partition(&partition))
            .collect()
    }

    /// All replicas hosted on the given broker, across all cached topics.
    pub fn replicas_on_broker(&self, broker_id: BrokerId) -> Vec<PartitionReplica> {
        self.topics
            .iter()
            .flat_map(|(name, assignment)| {
                assignment.partitions.iter().filter_map(move |(p, brokers)| {
                    brokers.contains(&broker_id).then(|| {
                        PartitionReplica::new(
                            TopicPartition {
                                topic: Arc::clone(name),
                                partition: *p,
                            },
                            broker_id,
                        )
                    })
                })
            })
            .collect()
    }

    /// Remove one replica from its partition's assignment.
    ///
    /// Called when a replica reaches its terminal state during topic
    /// teardown; the partition entry itself survives until `remove_topic`.
    pub fn remove_replica_from_assignment(&mut self, replica: &PartitionReplica) {
        if let Some(assignment) = self.topics.get_mut(replica.partition.topic.as_ref()) {
            assignment.remove_replica(replica.partition.partition, replica.broker_id);
        }
    }

    // ========================================================================
    // Broker liveness
    // ========================================================================

    /// Mark a broker as live.
    pub fn add_live_broker(&mut self, broker_id: BrokerId) {
        self.live_brokers.insert(broker_id);
        self.shutting_down_brokers.remove(&broker_id);
    }

    /// Mark a broker as no longer live.
    pub fn remove_live_broker(&mut self, broker_id: BrokerId) {
        self.live_brokers.remove(&broker_id);
        self.shutting_down_brokers.remove(&broker_id);
    }

    /// Record a controlled shutdown in progress for a broker.
    ///
    /// Shutting-down brokers no longer host leaders but still receive
    /// metadata updates until they disconnect.
    pub fn mark_broker_shutting_down(&mut self, broker_id: BrokerId) {
        if self.live_brokers.remove(&broker_id) {
            self.shutting_down_brokers.insert(broker_id);
        }
    }

    /// Whether the broker is currently live.
    pub fn is_broker_live(&self, broker_id: BrokerId) -> bool {
        self.live_brokers.contains(&broker_id)
    }

    /// Whether the replica's hosting broker is currently live.
    pub fn is_replica_online(&self, replica: &PartitionReplica) -> bool {
        self.is_broker_live(replica.broker_id)
    }

    /// Live broker ids, ascending.
    pub fn live_brokers(&self) -> Vec<BrokerId> {
        self.live_brokers.iter().copied().collect()
    }

    /// Brokers that should receive metadata updates: live plus
    /// shutting-down, ascending.
    pub fn live_or_shutting_down_brokers(&self) -> Vec<BrokerId> {
        self.live_brokers
            .union(&self.shutting_down_brokers)
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_partition_topic() -> ControllerContext {
        let mut ctx = ControllerContext::new();
        ctx.add_topic(
            "orders",
            TopicAssignment::new([
                (0, vec![BrokerId(1), BrokerId(2)]),
                (1, vec![BrokerId(2), BrokerId(3)]),
            ]),
        );
        ctx.add_live_broker(BrokerId(1));
        ctx.add_live_broker(BrokerId(2));
        ctx
    }

    #[test]
    fn test_partitions_for_topic() {
        let ctx = two_partition_topic();
        let partitions = ctx.partitions_for_topic("orders");
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].partition, 0);
        assert_eq!(partitions[1].partition, 1);
        assert!(ctx.partitions_for_topic("missing").is_empty());
    }

    #[test]
    fn test_replicas_for_topic() {
        let ctx = two_partition_topic();
        let replicas = ctx.replicas_for_topic("orders");
        assert_eq!(replicas.len(), 4);
    }

    #[test]
    fn test_replicas_on_broker() {
        let ctx = two_partition_topic();
        assert_eq!(ctx.replicas_on_broker(BrokerId(2)).len(), 2);
        assert_eq!(ctx.replicas_on_broker(BrokerId(3)).len(), 1);
        assert!(ctx.replicas_on_broker(BrokerId(9)).is_empty());
    }

    #[test]
    fn test_remove_replica_from_assignment() {
        let mut ctx = two_partition_topic();
        let replica = PartitionReplica::new(TopicPartition::new("orders", 0), BrokerId(1));
        ctx.remove_replica_from_assignment(&replica);

        let remaining = ctx.replicas_for_partition(&TopicPartition::new("orders", 0));
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].broker_id, BrokerId(2));
        // Partition entry survives until the topic is removed.
        assert_eq!(ctx.partitions_for_topic("orders").len(), 2);
    }

    #[test]
    fn test_broker_liveness_sets() {
        let mut ctx = two_partition_topic();
        assert!(ctx.is_broker_live(BrokerId(1)));
        assert!(!ctx.is_broker_live(BrokerId(3)));

        ctx.mark_broker_shutting_down(BrokerId(2));
        assert!(!ctx.is_broker_live(BrokerId(2)));
        assert_eq!(ctx.live_brokers(), vec![BrokerId(1)]);
        assert_eq!(
            ctx.live_or_shutting_down_brokers(),
            vec![BrokerId(1), BrokerId(2)]
        );

        ctx.remove_live_broker(BrokerId(2));
        assert_eq!(ctx.live_or_shutting_down_brokers(), vec![BrokerId(1)]);
    }

    #[test]
    fn test_epoch_bump() {
        let mut ctx = ControllerContext::new();
        assert_eq!(ctx.epoch(), ControllerEpoch::INITIAL);
        assert_eq!(ctx.bump_epoch().value(), 1);
        assert_eq!(ctx.bump_epoch().value(), 2);
    }
}
