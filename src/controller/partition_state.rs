//! Partition state machine for the controller.
//!
//! A much smaller sibling of the replica state machine: deletion teardown
//! only needs to walk partitions through `Offline` into `NonExistent`, but
//! the projection carries the full lifecycle so startup registration and
//! teardown share one transition function.
//!
//! # State Transitions
//!
//! ```text
//! NonExistent -> New -> Online <-> Offline -> NonExistent
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::context::ControllerContext;
use crate::error::{ControllerError, ControllerResult};
use crate::types::TopicPartition;

/// State of a partition from the controller's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionState {
    /// Created but never had a leader elected.
    New,

    /// Has an elected leader.
    Online,

    /// Lost its leader, or is being torn down.
    Offline,

    /// Terminal; the partition is removed from the projection.
    NonExistent,
}

impl PartitionState {
    /// States a partition may be in immediately before entering this one.
    pub fn valid_previous_states(self) -> &'static [PartitionState] {
        use PartitionState::*;
        match self {
            New => &[NonExistent],
            Online => &[New, Online, Offline],
            Offline => &[New, Online, Offline],
            NonExistent => &[Offline],
        }
    }

    /// Get a human-readable state name.
    pub fn state_name(self) -> &'static str {
        match self {
            PartitionState::New => "new",
            PartitionState::Online => "online",
            PartitionState::Offline => "offline",
            PartitionState::NonExistent => "non-existent",
        }
    }
}

impl std::fmt::Display for PartitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.state_name())
    }
}

/// The controller's projection of every tracked partition's state.
#[derive(Debug, Default)]
pub struct PartitionStateMachine {
    states: HashMap<TopicPartition, PartitionState>,
}

impl PartitionStateMachine {
    /// Create an empty projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the projection from the metadata cache.
    ///
    /// A partition with at least one replica on a live broker registers as
    /// `Online`, the rest as `Offline`. Called on controller election.
    pub fn startup(&mut self, ctx: &ControllerContext) {
        self.states.clear();
        for topic in ctx.all_topics() {
            for partition in ctx.partitions_for_topic(&topic) {
                let any_live = ctx
                    .replicas_for_partition(&partition)
                    .iter()
                    .any(|r| ctx.is_replica_online(r));
                let state = if any_live {
                    PartitionState::Online
                } else {
                    PartitionState::Offline
                };
                self.states.insert(partition, state);
            }
        }
    }

    /// The tracked state of a partition, if any.
    pub fn state_of(&self, partition: &TopicPartition) -> Option<PartitionState> {
        self.states.get(partition).copied()
    }

    /// Whether the projection tracks no partitions.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Move the given partitions to `target`.
    ///
    /// Fails on the first partition whose current state does not permit the
    /// transition. Entering `NonExistent` removes the partition from the
    /// projection.
    pub fn transition_to(
        &mut self,
        partitions: &[TopicPartition],
        target: PartitionState,
    ) -> ControllerResult<()> {
        for partition in partitions {
            let current = self
                .states
                .get(partition)
                .copied()
                .unwrap_or(PartitionState::NonExistent);
            if !target.valid_previous_states().contains(&current) {
                return Err(ControllerError::IllegalPartitionTransition {
                    partition: partition.clone(),
                    from: current.state_name(),
                    to: target.state_name(),
                });
            }

            if target == PartitionState::NonExistent {
                self.states.remove(partition);
                debug!(partition = %partition, from = current.state_name(), "Partition removed from projection");
                continue;
            }

            debug!(partition = %partition, from = current.state_name(), to = target.state_name(), "Partition state change");
            self.states.insert(partition.clone(), target);
        }
        Ok(())
    }

    /// Tracked partitions of the topic currently in `state`.
    pub fn partitions_in_state(&self, topic: &str, state: PartitionState) -> Vec<TopicPartition> {
        let mut partitions: Vec<TopicPartition> = self
            .states
            .iter()
            .filter(|(p, s)| p.topic.as_ref() == topic && **s == state)
            .map(|(p, _)| p.clone())
            .collect();
        partitions.sort();
        partitions
    }
}
