//! End-to-end scenarios for the topic deletion coordinator.
//!
//! Each test sets up a small cluster (metadata cache, in-memory store,
//! recording sender), drives the coordinator through its public operations,
//! and asserts the observable outcome: requests sent, replica states, and
//! durable-store contents.

use std::sync::Arc;

use topicreaper::controller::{
    ControllerConfig, ControllerContext, CoordinationStore, InMemoryCoordinationStore,
    RecordingControlSender, ReplicaState, TopicAssignment, TopicDeletionCoordinator,
    TopicToBeDeleted,
};
use topicreaper::types::{BrokerId, PartitionReplica, TopicPartition};

struct Cluster {
    coordinator: TopicDeletionCoordinator,
    store: Arc<InMemoryCoordinationStore>,
    sender: Arc<RecordingControlSender>,
}

async fn build_cluster_with_config(
    config: ControllerConfig,
    topics: Vec<(&str, Vec<(i32, Vec<i32>)>)>,
    live_brokers: Vec<i32>,
) -> Cluster {
    let mut ctx = ControllerContext::new();
    let store = Arc::new(InMemoryCoordinationStore::new());
    for (name, partitions) in &topics {
        ctx.add_topic(
            *name,
            TopicAssignment::new(
                partitions
                    .iter()
                    .map(|(p, brokers)| (*p, brokers.iter().map(|b| BrokerId(*b)).collect())),
            ),
        );
        store.register_topic(*name).await;
    }
    for broker in live_brokers {
        ctx.add_live_broker(BrokerId(broker));
    }
    let sender = Arc::new(RecordingControlSender::new());
    let coordinator = TopicDeletionCoordinator::new(
        &config,
        ctx,
        store.clone() as Arc<dyn CoordinationStore>,
        sender.clone(),
    );
    Cluster {
        coordinator,
        store,
        sender,
    }
}

async fn build_cluster(
    topics: Vec<(&str, Vec<(i32, Vec<i32>)>)>,
    live_brokers: Vec<i32>,
) -> Cluster {
    build_cluster_with_config(ControllerConfig::default(), topics, live_brokers).await
}

fn replica(topic: &str, partition: i32, broker: i32) -> PartitionReplica {
    PartitionReplica::new(TopicPartition::new(topic, partition), BrokerId(broker))
}

fn state_of(cluster: &Cluster, topic: &str, partition: i32, broker: i32) -> Option<ReplicaState> {
    cluster
        .coordinator
        .replica_states()
        .state_of(&replica(topic, partition, broker))
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_happy_path_deletes_topic_everywhere() {
    let mut cluster = build_cluster(
        vec![("A", vec![(0, vec![1, 2]), (1, vec![1, 2])])],
        vec![1, 2],
    )
    .await;
    cluster.store.create_deletion_intent("A", 100).await;
    cluster
        .coordinator
        .init(vec![], Default::default())
        .await
        .unwrap();

    cluster
        .coordinator
        .enqueue(vec![TopicToBeDeleted::new("A", 100)])
        .await
        .unwrap();

    // Brokers are fenced before any replica is stopped.
    let updates = cluster.sender.sent_metadata_updates().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, vec![BrokerId(1), BrokerId(2)]);
    assert_eq!(updates[0].1.leader, BrokerId::LEADER_DURING_DELETE);
    assert_eq!(updates[0].1.partitions.len(), 2);

    let deletes = cluster.sender.sent_deletes().await;
    assert_eq!(deletes.len(), 2);
    assert_eq!(deletes[0].0, BrokerId(1));
    assert_eq!(deletes[1].0, BrokerId(2));
    for (_, request) in &deletes {
        assert_eq!(request.partitions.len(), 2);
    }

    for broker in [1, 2] {
        for partition in [0, 1] {
            assert_eq!(
                state_of(&cluster, "A", partition, broker),
                Some(ReplicaState::DeletionStarted)
            );
        }
    }

    // All four replicas acknowledge deletion.
    let all = vec![
        replica("A", 0, 1),
        replica("A", 0, 2),
        replica("A", 1, 1),
        replica("A", 1, 2),
    ];
    cluster
        .coordinator
        .complete_replica_deletion(&all)
        .await
        .unwrap();

    assert!(!cluster.coordinator.is_topic_queued("A"));
    assert!(
        !cluster
            .coordinator
            .is_partition_queued(&TopicPartition::new("A", 0))
    );
    assert!(!cluster.store.has_topic_metadata("A").await);
    assert!(!cluster.store.has_topic_config("A").await);
    assert!(!cluster.store.has_deletion_intent("A").await);
    assert!(!cluster.store.has_partition_watch("A").await);
    assert!(!cluster.coordinator.ctx().contains_topic("A"));
    assert!(
        cluster
            .coordinator
            .replica_states()
            .replicas_for_topic("A")
            .is_empty()
    );
}

// ============================================================================
// Broker-down retry
// ============================================================================

#[tokio::test]
async fn test_dead_broker_blocks_then_retry_after_restart() {
    let mut cluster = build_cluster(
        vec![("A", vec![(0, vec![1, 2]), (1, vec![1, 2])])],
        vec![1],
    )
    .await;
    cluster.store.create_deletion_intent("A", 100).await;
    cluster
        .coordinator
        .init(vec![], Default::default())
        .await
        .unwrap();
    cluster
        .coordinator
        .enqueue(vec![TopicToBeDeleted::new("A", 100)])
        .await
        .unwrap();

    // Replicas on the dead broker are immediately ineligible and park the
    // topic; only broker 1 receives deletes.
    for partition in [0, 1] {
        assert_eq!(
            state_of(&cluster, "A", partition, 2),
            Some(ReplicaState::DeletionIneligible)
        );
    }
    assert!(cluster.coordinator.is_topic_ineligible("A"));
    let deletes = cluster.sender.sent_deletes().await;
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].0, BrokerId(1));

    // Broker 1 acknowledges; the topic stays queued.
    cluster
        .coordinator
        .complete_replica_deletion(&[replica("A", 0, 1), replica("A", 1, 1)])
        .await
        .unwrap();
    assert_eq!(
        state_of(&cluster, "A", 0, 1),
        Some(ReplicaState::DeletionSuccessful)
    );
    assert!(cluster.coordinator.is_topic_queued("A"));
    assert!(cluster.store.has_topic_metadata("A").await);

    // Broker 2 returns; the second pass only touches its replicas.
    cluster.coordinator.ctx_mut().add_live_broker(BrokerId(2));
    cluster.sender.clear().await;
    cluster
        .coordinator
        .resume_for_topics(&[Arc::from("A")])
        .await
        .unwrap();

    let deletes = cluster.sender.sent_deletes().await;
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].0, BrokerId(2));
    assert_eq!(deletes[0].1.partitions.len(), 2);
    assert_eq!(
        state_of(&cluster, "A", 0, 1),
        Some(ReplicaState::DeletionSuccessful)
    );

    cluster
        .coordinator
        .complete_replica_deletion(&[replica("A", 0, 2), replica("A", 1, 2)])
        .await
        .unwrap();
    assert!(!cluster.coordinator.is_topic_queued("A"));
    assert!(!cluster.store.has_deletion_intent("A").await);
    assert!(!cluster.store.has_topic_metadata("A").await);
}

// ============================================================================
// FIFO across topics
// ============================================================================

#[tokio::test]
async fn test_fifo_across_topics_with_stalled_head() {
    let mut cluster = build_cluster(
        vec![("A", vec![(0, vec![3])]), ("B", vec![(0, vec![1])])],
        vec![1],
    )
    .await;
    cluster.store.create_deletion_intent("A", 1).await;
    cluster.store.create_deletion_intent("B", 2).await;
    cluster
        .coordinator
        .init(vec![], Default::default())
        .await
        .unwrap();
    cluster
        .coordinator
        .enqueue(vec![
            TopicToBeDeleted::new("A", 1),
            TopicToBeDeleted::new("B", 2),
        ])
        .await
        .unwrap();

    // A is stalled on its dead broker; B must not move even though it could.
    assert!(cluster.coordinator.is_topic_ineligible("A"));
    assert!(cluster.sender.sent_deletes().await.is_empty());
    assert_eq!(state_of(&cluster, "B", 0, 1), Some(ReplicaState::Online));
    assert!(!cluster.coordinator.is_topic_deletion_in_progress("B"));

    // The head of the queue unblocks and must complete first.
    cluster.coordinator.ctx_mut().add_live_broker(BrokerId(3));
    cluster
        .coordinator
        .resume_for_topics(&[Arc::from("A")])
        .await
        .unwrap();
    let deletes = cluster.sender.sent_deletes().await;
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].0, BrokerId(3));
    assert!(!cluster.coordinator.is_topic_deletion_in_progress("B"));

    cluster
        .coordinator
        .complete_replica_deletion(&[replica("A", 0, 3)])
        .await
        .unwrap();

    // A is fully torn down and the queue advanced to B.
    assert!(!cluster.coordinator.is_topic_queued("A"));
    assert!(!cluster.store.has_topic_metadata("A").await);
    assert!(cluster.coordinator.is_topic_deletion_in_progress("B"));
    let deletes = cluster.sender.sent_deletes().await;
    let (broker_id, request) = deletes.last().unwrap();
    assert_eq!(*broker_id, BrokerId(1));
    assert_eq!(request.partitions[0].topic.as_ref(), "B");

    cluster
        .coordinator
        .complete_replica_deletion(&[replica("B", 0, 1)])
        .await
        .unwrap();
    assert!(!cluster.coordinator.is_topic_queued("B"));
    assert!(!cluster.store.has_deletion_intent("B").await);
}

// ============================================================================
// Controller failover
// ============================================================================

#[tokio::test]
async fn test_controller_failover_restarts_deletion() {
    let mut cluster = build_cluster(vec![("C", vec![(0, vec![1])])], vec![1]).await;
    cluster.store.create_deletion_intent("C", 5).await;

    cluster.coordinator.ctx_mut().bump_epoch();
    cluster
        .coordinator
        .init(vec![TopicToBeDeleted::new("C", 5)], Default::default())
        .await
        .unwrap();
    cluster.coordinator.resume_deletions().await.unwrap();
    assert_eq!(
        state_of(&cluster, "C", 0, 1),
        Some(ReplicaState::DeletionStarted)
    );

    // The controller resigns mid-flight.
    cluster.coordinator.reset();
    assert!(cluster.coordinator.queued_topics().is_empty());

    // A new controller takes over with the same durable-store contents.
    cluster.coordinator.ctx_mut().bump_epoch();
    let intents = cluster.store.list_deletion_intents().await.unwrap();
    let queued: Vec<TopicToBeDeleted> = intents.into_iter().map(Into::into).collect();
    cluster
        .coordinator
        .init(queued, Default::default())
        .await
        .unwrap();

    // The projection is rebuilt from cluster metadata: nothing is mid-flight.
    assert_eq!(state_of(&cluster, "C", 0, 1), Some(ReplicaState::Online));
    assert!(!cluster.coordinator.is_topic_deletion_in_progress("C"));
    assert!(cluster.coordinator.is_topic_queued("C"));

    cluster.sender.clear().await;
    cluster.coordinator.resume_deletions().await.unwrap();
    let deletes = cluster.sender.sent_deletes().await;
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].1.epoch.value(), 2);

    cluster
        .coordinator
        .complete_replica_deletion(&[replica("C", 0, 1)])
        .await
        .unwrap();
    assert!(!cluster.store.has_deletion_intent("C").await);
    assert!(!cluster.store.has_topic_metadata("C").await);
}

// ============================================================================
// Deletion disabled
// ============================================================================

#[tokio::test]
async fn test_disabled_deletion_purges_intents_only() {
    let config = ControllerConfig::default().with_deletion_disabled();
    let mut cluster =
        build_cluster_with_config(config, vec![("X", vec![(0, vec![1])])], vec![1]).await;
    cluster.store.create_deletion_intent("X", 1).await;

    cluster
        .coordinator
        .init(vec![TopicToBeDeleted::new("X", 1)], Default::default())
        .await
        .unwrap();
    assert!(!cluster.store.has_deletion_intent("X").await);
    assert!(cluster.store.has_topic_metadata("X").await);
    assert!(cluster.coordinator.queued_topics().is_empty());
    assert!(cluster.sender.sent().await.is_empty());
    assert!(cluster.coordinator.is_topic_ineligible("X"));

    // A marker created later is purged by enqueue as well.
    cluster.store.create_deletion_intent("X", 2).await;
    cluster
        .coordinator
        .enqueue(vec![TopicToBeDeleted::new("X", 2)])
        .await
        .unwrap();
    assert!(!cluster.store.has_deletion_intent("X").await);
    assert!(cluster.store.has_topic_metadata("X").await);
    assert!(cluster.sender.sent().await.is_empty());
    assert_eq!(state_of(&cluster, "X", 0, 1), Some(ReplicaState::Online));
}

// ============================================================================
// Dead replica classification
// ============================================================================

#[tokio::test]
async fn test_dead_replica_classification() {
    let mut cluster = build_cluster(vec![("D", vec![(0, vec![1, 2, 3])])], vec![1, 2]).await;
    cluster.store.create_deletion_intent("D", 7).await;
    cluster
        .coordinator
        .init(vec![], Default::default())
        .await
        .unwrap();
    cluster
        .coordinator
        .enqueue(vec![TopicToBeDeleted::new("D", 7)])
        .await
        .unwrap();

    assert_eq!(
        state_of(&cluster, "D", 0, 3),
        Some(ReplicaState::DeletionIneligible)
    );
    assert_eq!(
        state_of(&cluster, "D", 0, 1),
        Some(ReplicaState::DeletionStarted)
    );
    assert_eq!(
        state_of(&cluster, "D", 0, 2),
        Some(ReplicaState::DeletionStarted)
    );
    assert!(cluster.coordinator.is_topic_ineligible("D"));

    cluster
        .coordinator
        .complete_replica_deletion(&[replica("D", 0, 1), replica("D", 0, 2)])
        .await
        .unwrap();

    assert_eq!(
        state_of(&cluster, "D", 0, 1),
        Some(ReplicaState::DeletionSuccessful)
    );
    assert_eq!(
        state_of(&cluster, "D", 0, 2),
        Some(ReplicaState::DeletionSuccessful)
    );
    // No teardown while broker 3 is away.
    assert!(cluster.coordinator.is_topic_queued("D"));
    assert!(cluster.store.has_topic_metadata("D").await);
    assert!(cluster.store.has_deletion_intent("D").await);
    assert!(!cluster.coordinator.is_topic_deletion_in_progress("D"));
}
