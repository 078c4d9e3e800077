//! The controller's serialized event loop.
//!
//! Every input to the deletion subsystem — watch firings, broker responses,
//! liveness changes, resignation — is an event on one unbounded channel,
//! drained by a single task. The channel gives events a total order and the
//! coordinator's state needs no locking: each event is handled to completion
//! before the next is received.
//!
//! Stop-replica responses are fenced by controller epoch: a response stamped
//! with an earlier epoch belongs to a previous controller generation and is
//! dropped without touching any state.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::controller::config::ControllerConfig;
use crate::controller::deletion::{TopicDeletionCoordinator, TopicToBeDeleted};
use crate::controller::events::ControllerEvent;
use crate::controller::replica_state::ReplicaState;
use crate::error::ControllerResult;
use crate::types::{BrokerId, PartitionReplica};

/// Create the controller event channel.
///
/// The sender side is handed to every event producer: the durable-store
/// watcher, the response transport, and the failure detector.
pub fn event_channel() -> (
    mpsc::UnboundedSender<ControllerEvent>,
    mpsc::UnboundedReceiver<ControllerEvent>,
) {
    mpsc::unbounded_channel()
}

/// What the loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Keep processing events.
    Continue,
    /// This node resigned the controllership; stop processing.
    Resigned,
}

/// Drives the deletion coordinator from the controller event channel.
pub struct ControllerEventLoop {
    cluster_id: String,
    coordinator: TopicDeletionCoordinator,
    rx: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl ControllerEventLoop {
    /// Create an event loop over the given coordinator and channel.
    pub fn new(
        config: &ControllerConfig,
        coordinator: TopicDeletionCoordinator,
        rx: mpsc::UnboundedReceiver<ControllerEvent>,
    ) -> Self {
        Self {
            cluster_id: config.cluster_id.clone(),
            coordinator,
            rx,
        }
    }

    /// The coordinator, for queries from other controller subsystems.
    pub fn coordinator(&self) -> &TopicDeletionCoordinator {
        &self.coordinator
    }

    /// Mutable coordinator access, for operations other subsystems invoke
    /// directly on the event task (e.g. marking a topic ineligible while a
    /// reassignment is in flight).
    pub fn coordinator_mut(&mut self) -> &mut TopicDeletionCoordinator {
        &mut self.coordinator
    }

    /// Bootstrap after winning the controller election.
    ///
    /// Bumps the controller epoch, re-reads the surviving deletion-intent
    /// markers, seeds the coordinator, and immediately tries to make
    /// progress. Replicas that were mid-deletion under the previous
    /// controller re-register from cluster metadata and restart cleanly.
    pub async fn on_controller_election(&mut self) -> ControllerResult<()> {
        let epoch = self.coordinator.ctx_mut().bump_epoch();
        info!(cluster_id = %self.cluster_id, epoch = %epoch, "Elected controller");

        let intents = self.coordinator.store().list_deletion_intents().await?;
        let queued: Vec<TopicToBeDeleted> = intents.into_iter().map(Into::into).collect();
        self.coordinator.init(queued, HashSet::new()).await?;
        self.coordinator.resume_deletions().await
    }

    /// Process events until resignation or channel close.
    ///
    /// A fatal error (durable-store write failure during teardown) resigns
    /// the controller: state is reset and the error is returned so the
    /// embedding node can stand down and let the next controller retry.
    pub async fn run(&mut self) -> ControllerResult<()> {
        while let Some(event) = self.rx.recv().await {
            match self.handle_event(event).await {
                Ok(EventOutcome::Continue) => {}
                Ok(EventOutcome::Resigned) => break,
                Err(err) => {
                    error!(error = %err, "Event handling failed, resigning controllership");
                    self.coordinator.reset();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Handle one event to completion.
    pub async fn handle_event(&mut self, event: ControllerEvent) -> ControllerResult<EventOutcome> {
        match event {
            ControllerEvent::DeleteTopicsChildChange { topics } => {
                let store = self.coordinator.store();
                let mut entries = Vec::new();
                for topic in topics {
                    match store.read_deletion_intent(&topic).await? {
                        Some(intent) => entries.push(intent.into()),
                        None => {
                            debug!(topic = %topic, "Deletion intent vanished before processing")
                        }
                    }
                }
                self.coordinator.enqueue(entries).await?;
            }

            ControllerEvent::StopReplicaResponseReceived {
                broker_id,
                epoch,
                response,
            } => {
                let current = self.coordinator.ctx().epoch();
                if epoch != current {
                    debug!(
                        broker_id = %broker_id,
                        response_epoch = %epoch,
                        current_epoch = %current,
                        "Discarding stop-replica response from a previous controller epoch"
                    );
                    return Ok(EventOutcome::Continue);
                }

                let mut succeeded = Vec::new();
                let mut failed = Vec::new();
                for result in response.partitions {
                    let replica = PartitionReplica::new(result.partition.clone(), broker_id);
                    match &result.error {
                        None => succeeded.push(replica),
                        Some(reason) => {
                            warn!(replica = %replica, reason = %reason, "Stop-replica failed");
                            failed.push(replica);
                        }
                    }
                }
                if !failed.is_empty() {
                    self.coordinator.fail_replica_deletion(&failed).await?;
                }
                if !succeeded.is_empty() {
                    self.coordinator.complete_replica_deletion(&succeeded).await?;
                }
            }

            ControllerEvent::BrokerStartup { broker_id } => {
                self.on_broker_startup(broker_id).await?;
            }

            ControllerEvent::BrokerFailure { broker_id } => {
                self.on_broker_failure(broker_id).await?;
            }

            ControllerEvent::PartitionReassignmentComplete { partition } => {
                let topic = Arc::clone(&partition.topic);
                self.coordinator.resume_for_topics(&[topic]).await?;
            }

            ControllerEvent::ControllerResignation => {
                info!(cluster_id = %self.cluster_id, "Resigning controllership");
                self.coordinator.reset();
                return Ok(EventOutcome::Resigned);
            }
        }
        Ok(EventOutcome::Continue)
    }

    async fn on_broker_startup(&mut self, broker_id: BrokerId) -> ControllerResult<()> {
        info!(broker_id = %broker_id, "Broker started");
        self.coordinator.ctx_mut().add_live_broker(broker_id);

        let replicas = self.coordinator.ctx().replicas_on_broker(broker_id);
        let (queued, general): (Vec<PartitionReplica>, Vec<PartitionReplica>) = replicas
            .into_iter()
            .partition(|r| self.coordinator.is_topic_queued(r.topic()));

        let online_eligible = self
            .coordinator
            .replica_states()
            .filter_eligible_for(&general, ReplicaState::Online);
        self.coordinator
            .transition_replicas(&online_eligible, ReplicaState::Online)
            .await?;

        let topics: Vec<Arc<str>> = queued
            .iter()
            .map(|r| Arc::clone(r.topic()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.coordinator.resume_for_topics(&topics).await
    }

    async fn on_broker_failure(&mut self, broker_id: BrokerId) -> ControllerResult<()> {
        warn!(broker_id = %broker_id, "Broker failed");
        self.coordinator.ctx_mut().remove_live_broker(broker_id);

        let replicas = self.coordinator.ctx().replicas_on_broker(broker_id);
        let (queued, general): (Vec<PartitionReplica>, Vec<PartitionReplica>) = replicas
            .into_iter()
            .partition(|r| self.coordinator.is_topic_queued(r.topic()));

        let offline_eligible = self
            .coordinator
            .replica_states()
            .filter_eligible_for(&general, ReplicaState::Offline);
        self.coordinator
            .transition_replicas(&offline_eligible, ReplicaState::Offline)
            .await?;

        self.coordinator.fail_replica_deletion(&queued).await
    }
}
