//! Replica state machine for the controller.
//!
//! Tracks, for every (topic, partition, broker) triple the controller knows
//! about, which lifecycle state the replica occupies, and answers the state
//! queries the deletion coordinator drives its decisions with.
//!
//! # State Transitions
//!
//! ```text
//! NonExistent -> New -> Online <-> Offline
//!
//! Offline -> DeletionStarted -> DeletionSuccessful -> NonExistent
//!               |     ^
//!          (failure)  | (retry via Offline)
//!               v     |
//!         DeletionIneligible -> Offline | Online
//! ```
//!
//! Transitions are validated against the table above; an illegal transition
//! is a coordinator bug and is rejected with an error rather than applied.
//! Two transitions carry side effects: entering `Offline` stages a
//! `StopReplica(delete = false)` so the broker stops fetching, and entering
//! `DeletionStarted` stages the terminal `StopReplica(delete = true)`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::context::ControllerContext;
use crate::controller::dispatcher::ControlRequestBatch;
use crate::error::{ControllerError, ControllerResult};
use crate::types::PartitionReplica;

/// State of a replica from the controller's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaState {
    /// Just created as part of a new or expanded topic; not yet serving.
    New,

    /// Serving: fetching from the leader or leading itself.
    Online,

    /// Not serving, not yet instructed to delete.
    Offline,

    /// A stop-replica (delete = true) request is outstanding.
    DeletionStarted,

    /// The broker acknowledged deletion with no error.
    DeletionSuccessful,

    /// A deletion attempt failed or the hosting broker is down; blocks the
    /// topic from completing.
    DeletionIneligible,

    /// Terminal; the replica is removed from the projection.
    NonExistent,
}

impl ReplicaState {
    /// States a replica may be in immediately before entering this one.
    pub fn valid_previous_states(self) -> &'static [ReplicaState] {
        use ReplicaState::*;
        match self {
            New => &[NonExistent],
            Online => &[New, Online, Offline, DeletionIneligible],
            Offline => &[New, Online, Offline, DeletionIneligible],
            DeletionStarted => &[Offline],
            DeletionSuccessful => &[DeletionStarted],
            DeletionIneligible => &[Offline, DeletionStarted],
            NonExistent => &[DeletionSuccessful],
        }
    }

    /// Get a human-readable state name.
    pub fn state_name(self) -> &'static str {
        match self {
            ReplicaState::New => "new",
            ReplicaState::Online => "online",
            ReplicaState::Offline => "offline",
            ReplicaState::DeletionStarted => "deletion-started",
            ReplicaState::DeletionSuccessful => "deletion-successful",
            ReplicaState::DeletionIneligible => "deletion-ineligible",
            ReplicaState::NonExistent => "non-existent",
        }
    }
}

impl std::fmt::Display for ReplicaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.state_name())
    }
}

/// The controller's projection of every tracked replica's state.
#[derive(Debug, Default)]
pub struct ReplicaStateMachine {
    states: HashMap<PartitionReplica, ReplicaState>,
}

impl ReplicaStateMachine {
    /// Create an empty projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the projection from the metadata cache.
    ///
    /// Replicas on live brokers register as `Online`, the rest as
    /// `Offline`. Called on controller election; any previous state,
    /// including in-flight deletions from a prior generation, is discarded.
    pub fn startup(&mut self, ctx: &ControllerContext) {
        self.states.clear();
        for topic in ctx.all_topics() {
            for replica in ctx.replicas_for_topic(&topic) {
                let state = if ctx.is_replica_online(&replica) {
                    ReplicaState::Online
                } else {
                    ReplicaState::Offline
                };
                self.states.insert(replica, state);
            }
        }
    }

    /// The tracked state of a replica, if any.
    pub fn state_of(&self, replica: &PartitionReplica) -> Option<ReplicaState> {
        self.states.get(replica).copied()
    }

    /// Number of tracked replicas.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the projection tracks no replicas.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Move the given replicas to `target`, applying side effects.
    ///
    /// Fails on the first replica whose current state does not permit the
    /// transition. Entering `NonExistent` removes the replica from both the
    /// projection and the partition assignment cache.
    pub fn transition_to(
        &mut self,
        replicas: &[PartitionReplica],
        target: ReplicaState,
        ctx: &mut ControllerContext,
        batch: &mut ControlRequestBatch,
    ) -> ControllerResult<()> {
        for replica in replicas {
            let current = self
                .states
                .get(replica)
                .copied()
                .unwrap_or(ReplicaState::NonExistent);
            if !target.valid_previous_states().contains(&current) {
                return Err(ControllerError::IllegalReplicaTransition {
                    replica: replica.clone(),
                    from: current.state_name(),
                    to: target.state_name(),
                });
            }

            match target {
                ReplicaState::Offline => {
                    batch.add_stop_replica(replica.broker_id, replica.partition.clone(), false);
                }
                ReplicaState::DeletionStarted => {
                    batch.add_stop_replica(replica.broker_id, replica.partition.clone(), true);
                }
                ReplicaState::NonExistent => {
                    ctx.remove_replica_from_assignment(replica);
                    self.states.remove(replica);
                    debug!(replica = %replica, from = current.state_name(), "Replica removed from projection");
                    continue;
                }
                _ => {}
            }

            debug!(replica = %replica, from = current.state_name(), to = target.state_name(), "Replica state change");
            self.states.insert(replica.clone(), target);
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Tracked replicas of the given topic.
    pub fn replicas_for_topic(&self, topic: &str) -> Vec<PartitionReplica> {
        let mut replicas: Vec<PartitionReplica> = self
            .states
            .keys()
            .filter(|r| r.topic().as_ref() == topic)
            .cloned()
            .collect();
        replicas.sort();
        replicas
    }

    /// Tracked replicas of the topic currently in `state`.
    pub fn replicas_in_state(&self, topic: &str, state: ReplicaState) -> Vec<PartitionReplica> {
        let mut replicas: Vec<PartitionReplica> = self
            .states
            .iter()
            .filter(|(r, s)| r.topic().as_ref() == topic && **s == state)
            .map(|(r, _)| r.clone())
            .collect();
        replicas.sort();
        replicas
    }

    /// Whether any tracked replica of the topic is in `state`.
    pub fn any_replica_in_state(&self, topic: &str, state: ReplicaState) -> bool {
        self.states
            .iter()
            .any(|(r, s)| r.topic().as_ref() == topic && *s == state)
    }

    /// Whether every tracked replica of the topic is in `state`.
    ///
    /// Vacuously true for a topic with no tracked replicas; a queued topic
    /// that no longer has replicas has nothing left to delete.
    pub fn are_all_replicas_in_state(&self, topic: &str, state: ReplicaState) -> bool {
        self.states
            .iter()
            .filter(|(r, _)| r.topic().as_ref() == topic)
            .all(|(_, s)| *s == state)
    }

    /// Subset of `replicas` currently in `state`.
    pub fn filter_by_state(
        &self,
        replicas: &[PartitionReplica],
        state: ReplicaState,
    ) -> Vec<PartitionReplica> {
        replicas
            .iter()
            .filter(|r| self.state_of(r) == Some(state))
            .cloned()
            .collect()
    }

    /// Subset of `replicas` whose current state permits a transition to
    /// `target`.
    pub fn filter_eligible_for(
        &self,
        replicas: &[PartitionReplica],
        target: ReplicaState,
    ) -> Vec<PartitionReplica> {
        replicas
            .iter()
            .filter(|r| {
                let current = self
                    .state_of(r)
                    .unwrap_or(ReplicaState::NonExistent);
                target.valid_previous_states().contains(&current)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::context::TopicAssignment;
    use crate::types::{BrokerId, TopicPartition};

    fn ctx_with_topic(live: &[i32], assigned: &[i32]) -> ControllerContext {
        let mut ctx = ControllerContext::new();
        ctx.add_topic(
            "orders",
            TopicAssignment::new([(0, assigned.iter().map(|b| BrokerId(*b)).collect())]),
        );
        for b in live {
            ctx.add_live_broker(BrokerId(*b));
        }
        ctx
    }

    fn replica(broker: i32) -> PartitionReplica {
        PartitionReplica::new(TopicPartition::new("orders", 0), BrokerId(broker))
    }

    #[test]
    fn test_startup_classifies_by_liveness() {
        let ctx = ctx_with_topic(&[1], &[1, 2]);
        let mut machine = ReplicaStateMachine::new();
        machine.startup(&ctx);

        assert_eq!(machine.state_of(&replica(1)), Some(ReplicaState::Online));
        assert_eq!(machine.state_of(&replica(2)), Some(ReplicaState::Offline));
    }

    #[test]
    fn test_deletion_transition_chain() {
        let mut ctx = ctx_with_topic(&[1], &[1]);
        let mut machine = ReplicaStateMachine::new();
        machine.startup(&ctx);
        let mut batch = ControlRequestBatch::new();

        let replicas = vec![replica(1)];
        machine
            .transition_to(&replicas, ReplicaState::Offline, &mut ctx, &mut batch)
            .unwrap();
        machine
            .transition_to(&replicas, ReplicaState::DeletionStarted, &mut ctx, &mut batch)
            .unwrap();
        machine
            .transition_to(&replicas, ReplicaState::DeletionSuccessful, &mut ctx, &mut batch)
            .unwrap();
        machine
            .transition_to(&replicas, ReplicaState::NonExistent, &mut ctx, &mut batch)
            .unwrap();

        assert!(machine.is_empty());
        assert!(ctx.replicas_for_partition(&TopicPartition::new("orders", 0)).is_empty());
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut ctx = ctx_with_topic(&[1], &[1]);
        let mut machine = ReplicaStateMachine::new();
        machine.startup(&ctx);
        let mut batch = ControlRequestBatch::new();

        let err = machine
            .transition_to(
                &[replica(1)],
                ReplicaState::DeletionSuccessful,
                &mut ctx,
                &mut batch,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::IllegalReplicaTransition { from: "online", .. }
        ));
        // State unchanged on rejection.
        assert_eq!(machine.state_of(&replica(1)), Some(ReplicaState::Online));
    }

    #[test]
    fn test_ineligible_retry_path() {
        let mut ctx = ctx_with_topic(&[1], &[1]);
        let mut machine = ReplicaStateMachine::new();
        machine.startup(&ctx);
        let mut batch = ControlRequestBatch::new();

        let replicas = vec![replica(1)];
        machine
            .transition_to(&replicas, ReplicaState::Offline, &mut ctx, &mut batch)
            .unwrap();
        machine
            .transition_to(&replicas, ReplicaState::DeletionIneligible, &mut ctx, &mut batch)
            .unwrap();
        machine
            .transition_to(&replicas, ReplicaState::Offline, &mut ctx, &mut batch)
            .unwrap();
        machine
            .transition_to(&replicas, ReplicaState::DeletionStarted, &mut ctx, &mut batch)
            .unwrap();

        assert_eq!(
            machine.state_of(&replica(1)),
            Some(ReplicaState::DeletionStarted)
        );
    }

    #[test]
    fn test_queries() {
        let mut ctx = ctx_with_topic(&[1, 2], &[1, 2]);
        let mut machine = ReplicaStateMachine::new();
        machine.startup(&ctx);
        let mut batch = ControlRequestBatch::new();

        assert!(machine.are_all_replicas_in_state("orders", ReplicaState::Online));
        assert!(machine.are_all_replicas_in_state("unknown", ReplicaState::DeletionSuccessful));
        assert!(!machine.any_replica_in_state("orders", ReplicaState::Offline));

        machine
            .transition_to(&[replica(1)], ReplicaState::Offline, &mut ctx, &mut batch)
            .unwrap();
        assert!(machine.any_replica_in_state("orders", ReplicaState::Offline));
        assert!(!machine.are_all_replicas_in_state("orders", ReplicaState::Online));
        assert_eq!(
            machine.replicas_in_state("orders", ReplicaState::Offline),
            vec![replica(1)]
        );
        assert_eq!(machine.replicas_for_topic("orders").len(), 2);
    }

    #[test]
    fn test_filter_eligible_for() {
        let mut ctx = ctx_with_topic(&[1, 2], &[1, 2]);
        let mut machine = ReplicaStateMachine::new();
        machine.startup(&ctx);
        let mut batch = ControlRequestBatch::new();

        machine
            .transition_to(&[replica(1)], ReplicaState::Offline, &mut ctx, &mut batch)
            .unwrap();

        // Only the offline replica may start deletion.
        let eligible =
            machine.filter_eligible_for(&[replica(1), replica(2)], ReplicaState::DeletionStarted);
        assert_eq!(eligible, vec![replica(1)]);
    }

    #[test]
    fn test_new_replica_registration() {
        let mut ctx = ctx_with_topic(&[1], &[1]);
        let mut machine = ReplicaStateMachine::new();
        let mut batch = ControlRequestBatch::new();

        machine
            .transition_to(&[replica(1)], ReplicaState::New, &mut ctx, &mut batch)
            .unwrap();
        machine
            .transition_to(&[replica(1)], ReplicaState::Online, &mut ctx, &mut batch)
            .unwrap();
        assert_eq!(machine.state_of(&replica(1)), Some(ReplicaState::Online));
    }
}
