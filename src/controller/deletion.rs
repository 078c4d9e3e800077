//! Topic deletion coordination.
//!
//! The coordinator owns the deletion queue and drives one topic at a time
//! through replica teardown, metadata teardown, and durable-store cleanup.
//! It reacts to events only; long waits (stop-replica responses, broker
//! restarts) are simply the absence of further events.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                   TopicDeletionCoordinator                      │
//! │                                                                 │
//! │  topics_to_be_deleted ─┐                                        │
//! │  partitions_to_be_deleted ─┼── selection: oldest intent first   │
//! │  topics_ineligible ────┘                                        │
//! │                                                                 │
//! │  ┌──────────────────┐  ┌───────────────────┐  ┌─────────────┐  │
//! │  │ ReplicaState     │  │ PartitionState    │  │ Controller  │  │
//! │  │ Machine          │  │ Machine           │  │ Context     │  │
//! │  └────────┬─────────┘  └─────────┬─────────┘  └──────┬──────┘  │
//! │           └──────────────────────┼───────────────────┘         │
//! │                                  ▼                              │
//! │            ControlRequestBatch ──► ControlRequestSender         │
//! │            CoordinationStore  (markers, metadata, config)       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Deletion of distinct topics is strictly serialized: at most one topic
//! has replicas with an outstanding stop-replica at any moment, and topics
//! are selected in ascending intent-creation time (ties broken by name).
//! A topic that cannot progress (dead broker, ongoing reassignment) is
//! parked as ineligible and retried when an unblocking event arrives.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::controller::config::ControllerConfig;
use crate::controller::context::ControllerContext;
use crate::controller::dispatcher::{ControlRequestBatch, ControlRequestSender};
use crate::controller::partition_state::{PartitionState, PartitionStateMachine};
use crate::controller::replica_state::{ReplicaState, ReplicaStateMachine};
use crate::controller::store::{CoordinationStore, DeletionIntent};
use crate::error::ControllerResult;
use crate::types::{BrokerId, PartitionReplica, TopicPartition};

/// One entry in the deletion queue.
///
/// Identity is the topic name; `enqueued_at_ms` is the creation time of the
/// deletion-intent marker in the durable store, so it survives controller
/// failover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicToBeDeleted {
    pub topic: Arc<str>,
    pub enqueued_at_ms: u64,
}

impl TopicToBeDeleted {
    /// Create a queue entry.
    pub fn new(topic: impl Into<Arc<str>>, enqueued_at_ms: u64) -> Self {
        Self {
            topic: topic.into(),
            enqueued_at_ms,
        }
    }
}

impl From<DeletionIntent> for TopicToBeDeleted {
    fn from(intent: DeletionIntent) -> Self {
        Self {
            topic: intent.topic,
            enqueued_at_ms: intent.created_at_ms,
        }
    }
}

/// Coordinates asynchronous deletion of whole topics.
///
/// All state is exclusively owned and must only be touched from the
/// controller event task; operations run to completion before the next
/// event is processed.
pub struct TopicDeletionCoordinator {
    enabled: bool,
    ctx: ControllerContext,
    replica_states: ReplicaStateMachine,
    partition_states: PartitionStateMachine,
    store: Arc<dyn CoordinationStore>,
    sender: Arc<dyn ControlRequestSender>,
    batch: ControlRequestBatch,

    topics_to_be_deleted: HashMap<Arc<str>, TopicToBeDeleted>,
    partitions_to_be_deleted: HashSet<TopicPartition>,
    topics_ineligible_for_deletion: HashSet<Arc<str>>,
}

impl TopicDeletionCoordinator {
    /// Create a coordinator over the given metadata cache and seams.
    pub fn new(
        config: &ControllerConfig,
        ctx: ControllerContext,
        store: Arc<dyn CoordinationStore>,
        sender: Arc<dyn ControlRequestSender>,
    ) -> Self {
        Self {
            enabled: config.delete_topic_enable,
            ctx,
            replica_states: ReplicaStateMachine::new(),
            partition_states: PartitionStateMachine::new(),
            store,
            sender,
            batch: ControlRequestBatch::new(),
            topics_to_be_deleted: HashMap::new(),
            partitions_to_be_deleted: HashSet::new(),
            topics_ineligible_for_deletion: HashSet::new(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Seed the coordinator when this node becomes controller.
    ///
    /// Rebuilds both state projections from the metadata cache, then seeds
    /// the deletion queue from the surviving intent markers. When deletion
    /// is disabled, stale markers are purged from the durable store and
    /// nothing is queued.
    pub async fn init(
        &mut self,
        initial_queued: Vec<TopicToBeDeleted>,
        initial_ineligible: HashSet<Arc<str>>,
    ) -> ControllerResult<()> {
        self.replica_states.startup(&self.ctx);
        self.partition_states.startup(&self.ctx);

        if !self.enabled {
            let intents = self.store.list_deletion_intents().await?;
            for intent in intents {
                info!(topic = %intent.topic, "Topic deletion disabled, purging stale deletion intent");
                self.store.delete_deletion_intent(&intent.topic).await?;
            }
            return Ok(());
        }

        self.topics_to_be_deleted.clear();
        self.partitions_to_be_deleted.clear();
        for entry in initial_queued {
            self.partitions_to_be_deleted
                .extend(self.ctx.partitions_for_topic(&entry.topic));
            self.insert_queued(entry);
        }
        self.topics_ineligible_for_deletion = initial_ineligible
            .into_iter()
            .filter(|t| self.topics_to_be_deleted.contains_key(t))
            .collect();

        info!(
            queued = self.topics_to_be_deleted.len(),
            ineligible = self.topics_ineligible_for_deletion.len(),
            "Topic deletion coordinator initialized"
        );
        Ok(())
    }

    /// Add topics to the deletion queue and try to make progress.
    ///
    /// Idempotent: re-enqueueing a queued topic keeps its earliest intent
    /// time. When deletion is disabled the intent markers are removed from
    /// the durable store and the topics' data is left untouched.
    pub async fn enqueue(&mut self, topics: Vec<TopicToBeDeleted>) -> ControllerResult<()> {
        if !self.enabled {
            for entry in &topics {
                info!(topic = %entry.topic, "Topic deletion disabled, removing deletion intent");
                self.store.delete_deletion_intent(&entry.topic).await?;
            }
            return Ok(());
        }

        for entry in topics {
            if !self.topics_to_be_deleted.contains_key(&entry.topic) {
                info!(topic = %entry.topic, "Topic enqueued for deletion");
                self.partitions_to_be_deleted
                    .extend(self.ctx.partitions_for_topic(&entry.topic));
            }
            self.insert_queued(entry);
        }
        self.resume_deletions().await
    }

    /// Discard all coordinator state on controller resignation.
    ///
    /// Responses still in flight are discarded by the event loop's epoch
    /// check, never by the coordinator itself.
    pub fn reset(&mut self) {
        info!("Resetting topic deletion coordinator");
        self.topics_to_be_deleted.clear();
        self.partitions_to_be_deleted.clear();
        self.topics_ineligible_for_deletion.clear();
        self.batch.clear();
    }

    // ========================================================================
    // Progress and failure callbacks
    // ========================================================================

    /// Unblock the given topics and try to make progress.
    ///
    /// Called on events that may have cleared a blocker: a broker restart
    /// or a completed partition reassignment.
    pub async fn resume_for_topics(&mut self, topics: &[Arc<str>]) -> ControllerResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let queued: Vec<Arc<str>> = topics
            .iter()
            .filter(|t| self.is_topic_queued(t))
            .cloned()
            .collect();
        if queued.is_empty() {
            return Ok(());
        }
        for topic in &queued {
            if self.topics_ineligible_for_deletion.remove(topic) {
                info!(topic = %topic, "Topic deletion unblocked");
            }
        }
        self.resume_deletions().await
    }

    /// Park the given queued topics as unable to progress.
    ///
    /// Does not try to resume: marking a topic ineligible can never unblock
    /// anything.
    pub fn mark_ineligible(&mut self, topics: &[Arc<str>]) {
        if !self.enabled {
            return;
        }
        for topic in topics {
            if self.is_topic_queued(topic)
                && self.topics_ineligible_for_deletion.insert(Arc::clone(topic))
            {
                info!(topic = %topic, "Topic deletion marked ineligible");
            }
        }
    }

    /// Record failed replica deletions and park their topics.
    ///
    /// Called on stop-replica error responses, and by the broker failure
    /// handler for replicas whose response will never arrive.
    pub async fn fail_replica_deletion(
        &mut self,
        replicas: &[PartitionReplica],
    ) -> ControllerResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let queued: Vec<PartitionReplica> = replicas
            .iter()
            .filter(|r| self.is_topic_queued(r.topic()))
            .cloned()
            .collect();
        if queued.is_empty() {
            return Ok(());
        }
        warn!(
            replicas = queued.len(),
            "Replica deletions failed, parking their topics"
        );

        let eligible = self
            .replica_states
            .filter_eligible_for(&queued, ReplicaState::DeletionIneligible);
        self.replica_states.transition_to(
            &eligible,
            ReplicaState::DeletionIneligible,
            &mut self.ctx,
            &mut self.batch,
        )?;

        let topics: Vec<Arc<str>> = queued
            .iter()
            .map(|r| Arc::clone(r.topic()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.mark_ineligible(&topics);

        self.resume_deletions().await
    }

    /// Record successful replica deletions and try to make progress.
    pub async fn complete_replica_deletion(
        &mut self,
        replicas: &[PartitionReplica],
    ) -> ControllerResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let queued: Vec<PartitionReplica> = replicas
            .iter()
            .filter(|r| self.is_topic_queued(r.topic()))
            .cloned()
            .collect();
        let started = self
            .replica_states
            .filter_by_state(&queued, ReplicaState::DeletionStarted);
        if !started.is_empty() {
            debug!(replicas = started.len(), "Replica deletions succeeded");
            self.replica_states.transition_to(
                &started,
                ReplicaState::DeletionSuccessful,
                &mut self.ctx,
                &mut self.batch,
            )?;
        }
        self.resume_deletions().await
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    /// Whether the topic is queued for deletion.
    pub fn is_topic_queued(&self, topic: &str) -> bool {
        self.topics_to_be_deleted.contains_key(topic)
    }

    /// Whether the partition belongs to a topic queued for deletion.
    pub fn is_partition_queued(&self, partition: &TopicPartition) -> bool {
        self.partitions_to_be_deleted.contains(partition)
    }

    /// Whether the topic is currently unable to progress.
    ///
    /// Every topic is ineligible while deletion is disabled cluster-wide.
    pub fn is_topic_ineligible(&self, topic: &str) -> bool {
        !self.enabled || self.topics_ineligible_for_deletion.contains(topic)
    }

    /// Whether any replica of the topic has an outstanding stop-replica.
    pub fn is_topic_deletion_in_progress(&self, topic: &str) -> bool {
        self.replica_states
            .any_replica_in_state(topic, ReplicaState::DeletionStarted)
    }

    fn is_topic_eligible_for_deletion(&self, topic: &str) -> bool {
        self.is_topic_queued(topic)
            && !self.is_topic_deletion_in_progress(topic)
            && !self.is_topic_ineligible(topic)
    }

    // ========================================================================
    // The resume algorithm
    // ========================================================================

    /// Try to make progress on the deletion queue.
    ///
    /// Selects the single queued topic with the oldest intent (ties broken
    /// by name) and either completes it, leaves it awaiting responses,
    /// or (re)starts replica deletion for it. Completing a topic loops to
    /// select the next one.
    pub async fn resume_deletions(&mut self) -> ControllerResult<()> {
        if !self.enabled {
            return Ok(());
        }
        loop {
            let Some(topic) = self.next_topic_for_deletion() else {
                break;
            };

            if self
                .replica_states
                .are_all_replicas_in_state(&topic, ReplicaState::DeletionSuccessful)
            {
                self.complete_delete_topic(&topic).await?;
                continue;
            }

            if self.is_topic_deletion_in_progress(&topic) {
                debug!(topic = %topic, "Topic deletion in flight, awaiting stop-replica responses");
                break;
            }

            let blocked = self
                .replica_states
                .replicas_in_state(&topic, ReplicaState::DeletionIneligible);
            if !blocked.is_empty() {
                self.retry_blocked_replicas(&topic, &blocked).await?;
            }

            if self.is_topic_eligible_for_deletion(&topic) {
                info!(topic = %topic, "Starting topic deletion");
                self.on_topic_deletion(&topic).await?;
            } else {
                info!(topic = %topic, "Topic deletion blocked, awaiting an unblocking event");
            }
            break;
        }
        Ok(())
    }

    /// Topic with the smallest (intent time, name) key.
    fn next_topic_for_deletion(&self) -> Option<Arc<str>> {
        self.topics_to_be_deleted
            .values()
            .min_by(|a, b| {
                (a.enqueued_at_ms, a.topic.as_ref()).cmp(&(b.enqueued_at_ms, b.topic.as_ref()))
            })
            .map(|entry| Arc::clone(&entry.topic))
    }

    /// Move deletion-ineligible replicas back to offline so the next start
    /// attempt can pick them up.
    async fn retry_blocked_replicas(
        &mut self,
        topic: &Arc<str>,
        blocked: &[PartitionReplica],
    ) -> ControllerResult<()> {
        debug!(topic = %topic, replicas = blocked.len(), "Retrying blocked replica deletions");
        self.batch.new_batch()?;
        self.replica_states.transition_to(
            blocked,
            ReplicaState::Offline,
            &mut self.ctx,
            &mut self.batch,
        )?;
        let epoch = self.ctx.epoch();
        let sender = Arc::clone(&self.sender);
        self.batch.send(sender.as_ref(), epoch).await
    }

    // ========================================================================
    // Deletion kick-off
    // ========================================================================

    /// Fence the topic's partitions on every broker, then start replica
    /// deletion.
    ///
    /// The metadata update carries the delete sentinel leader and is sent
    /// strictly before any stop-replica.
    async fn on_topic_deletion(&mut self, topic: &Arc<str>) -> ControllerResult<()> {
        let partitions = self.ctx.partitions_for_topic(topic);

        self.batch.new_batch()?;
        self.batch.add_update_metadata_for_brokers(
            self.ctx.live_or_shutting_down_brokers(),
            partitions.clone(),
            BrokerId::LEADER_DURING_DELETE,
        );
        let epoch = self.ctx.epoch();
        let sender = Arc::clone(&self.sender);
        self.batch.send(sender.as_ref(), epoch).await?;

        self.on_partition_deletion(&partitions).await
    }

    /// Expand partitions to their full replica sets and start deleting.
    async fn on_partition_deletion(
        &mut self,
        partitions: &[TopicPartition],
    ) -> ControllerResult<()> {
        let replicas: Vec<PartitionReplica> = partitions
            .iter()
            .flat_map(|p| self.ctx.replicas_for_partition(p))
            .collect();
        self.start_replica_deletion(&replicas).await
    }

    /// Issue stop-replica (delete) to every reachable replica.
    ///
    /// Per topic: replicas on dead brokers go straight to ineligible and
    /// park the topic; reachable replicas that have not already succeeded
    /// are moved through offline (stopping any fetching) into
    /// deletion-started with the terminal stop-replica staged.
    async fn start_replica_deletion(
        &mut self,
        replicas: &[PartitionReplica],
    ) -> ControllerResult<()> {
        let mut by_topic: BTreeMap<Arc<str>, Vec<PartitionReplica>> = BTreeMap::new();
        for replica in replicas {
            by_topic
                .entry(Arc::clone(replica.topic()))
                .or_default()
                .push(replica.clone());
        }

        for (topic, topic_replicas) in by_topic {
            let (alive, dead): (Vec<_>, Vec<_>) = topic_replicas
                .into_iter()
                .partition(|r| self.ctx.is_replica_online(r));
            let successful = self
                .replica_states
                .replicas_in_state(&topic, ReplicaState::DeletionSuccessful);
            let retry: Vec<PartitionReplica> = alive
                .into_iter()
                .filter(|r| !successful.contains(r))
                .collect();

            self.batch.new_batch()?;
            let dead_eligible = self
                .replica_states
                .filter_eligible_for(&dead, ReplicaState::DeletionIneligible);
            self.replica_states.transition_to(
                &dead_eligible,
                ReplicaState::DeletionIneligible,
                &mut self.ctx,
                &mut self.batch,
            )?;
            self.replica_states.transition_to(
                &retry,
                ReplicaState::Offline,
                &mut self.ctx,
                &mut self.batch,
            )?;
            self.replica_states.transition_to(
                &retry,
                ReplicaState::DeletionStarted,
                &mut self.ctx,
                &mut self.batch,
            )?;
            let epoch = self.ctx.epoch();
            let sender = Arc::clone(&self.sender);
            self.batch.send(sender.as_ref(), epoch).await?;

            if !dead.is_empty() {
                warn!(
                    topic = %topic,
                    dead_replicas = dead.len(),
                    "Some replicas are unreachable, topic deletion cannot complete yet"
                );
                self.mark_ineligible(&[topic]);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Remove every trace of a fully-deleted topic.
    ///
    /// This is the only place a topic leaves the deletion queue and the
    /// only place its durable-store paths are removed. Step order matters:
    /// the partition-modifications watch goes first (a re-created topic of
    /// the same name must not fire the old watch), the intent marker last.
    async fn complete_delete_topic(&mut self, topic: &Arc<str>) -> ControllerResult<()> {
        info!(topic = %topic, "Topic deletion complete, tearing down metadata");

        self.store
            .deregister_partition_modifications_watch(topic)
            .await?;

        let partitions = self.ctx.partitions_for_topic(topic);
        let successful = self
            .replica_states
            .replicas_in_state(topic, ReplicaState::DeletionSuccessful);
        self.replica_states.transition_to(
            &successful,
            ReplicaState::NonExistent,
            &mut self.ctx,
            &mut self.batch,
        )?;
        self.partition_states
            .transition_to(&partitions, PartitionState::Offline)?;
        self.partition_states
            .transition_to(&partitions, PartitionState::NonExistent)?;

        self.topics_to_be_deleted.remove(topic);
        self.topics_ineligible_for_deletion.remove(topic);
        self.partitions_to_be_deleted
            .retain(|p| p.topic.as_ref() != topic.as_ref());

        self.store.delete_topic_metadata(topic).await?;
        self.store.delete_topic_config(topic).await?;
        self.store.delete_deletion_intent(topic).await?;

        self.ctx.remove_topic(topic);
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The metadata cache.
    pub fn ctx(&self) -> &ControllerContext {
        &self.ctx
    }

    /// Mutable access to the metadata cache, for liveness and topic
    /// bookkeeping driven by the event loop.
    pub fn ctx_mut(&mut self) -> &mut ControllerContext {
        &mut self.ctx
    }

    /// The replica state projection.
    pub fn replica_states(&self) -> &ReplicaStateMachine {
        &self.replica_states
    }

    /// The partition state projection.
    pub fn partition_states(&self) -> &PartitionStateMachine {
        &self.partition_states
    }

    /// Handle to the durable store gateway.
    pub fn store(&self) -> Arc<dyn CoordinationStore> {
        Arc::clone(&self.store)
    }

    /// Queue entries ordered oldest-first (the selection order).
    pub fn queued_topics(&self) -> Vec<TopicToBeDeleted> {
        let mut entries: Vec<TopicToBeDeleted> = self.topics_to_be_deleted.values().cloned().collect();
        entries.sort_by(|a, b| {
            (a.enqueued_at_ms, a.topic.as_ref()).cmp(&(b.enqueued_at_ms, b.topic.as_ref()))
        });
        entries
    }

    /// Names of currently parked topics, sorted.
    pub fn ineligible_topics(&self) -> Vec<Arc<str>> {
        let mut topics: Vec<Arc<str>> = self.topics_ineligible_for_deletion.iter().cloned().collect();
        topics.sort();
        topics
    }

    /// General replica lifecycle transitions driven by the event loop
    /// (broker startup/failure handling for topics not queued for
    /// deletion).
    pub(crate) async fn transition_replicas(
        &mut self,
        replicas: &[PartitionReplica],
        target: ReplicaState,
    ) -> ControllerResult<()> {
        if replicas.is_empty() {
            return Ok(());
        }
        self.batch.new_batch()?;
        self.replica_states
            .transition_to(replicas, target, &mut self.ctx, &mut self.batch)?;
        let epoch = self.ctx.epoch();
        let sender = Arc::clone(&self.sender);
        self.batch.send(sender.as_ref(), epoch).await
    }

    fn insert_queued(&mut self, entry: TopicToBeDeleted) {
        match self.topics_to_be_deleted.entry(Arc::clone(&entry.topic)) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                if entry.enqueued_at_ms < slot.get().enqueued_at_ms {
                    slot.get_mut().enqueued_at_ms = entry.enqueued_at_ms;
                }
            }
        }
    }
}
