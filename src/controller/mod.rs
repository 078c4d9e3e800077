//! Controller-side topic deletion for a partitioned log cluster.
//!
//! One cluster node at a time is elected controller and owns cluster-wide
//! metadata. This module implements the controller's topic-deletion
//! subsystem: the deletion queue and its state machine, the replica and
//! partition state projections it drives, the gateway to the durable
//! coordination store, and the outbound request batch.
//!
//! # Architecture
//!
//! ```text
//!  operator CLI ──► /admin/delete_topics/<t> ──► watch ─┐
//!  broker responses ──────────────────────────► events ─┤
//!  failure detector ──────────────────────────► events ─┤
//!                                                       ▼
//!                                            ┌─────────────────────┐
//!                                            │ ControllerEventLoop │ (one task)
//!                                            └──────────┬──────────┘
//!                                                       ▼
//!                                          ┌─────────────────────────┐
//!                                          │ TopicDeletionCoordinator│
//!                                          │  replica/partition SMs  │
//!                                          │  metadata cache (ctx)   │
//!                                          └────────┬───────┬────────┘
//!                                                   │       │
//!                                  ControlRequestSender   CoordinationStore
//!                                  (UpdateMetadata,       (markers, topic
//!                                   StopReplica)           metadata, config)
//! ```
//!
//! Deletion is strictly serialized across topics (oldest intent first),
//! idempotent under re-enqueue and controller failover, and driven entirely
//! by events: broker acknowledgements advance replicas, broker failures
//! park topics, broker restarts and reassignment completions resume them.

pub mod config;
pub mod context;
pub mod deletion;
pub mod dispatcher;
pub mod event_loop;
pub mod events;
pub mod partition_state;
pub mod replica_state;
pub mod store;

#[cfg(any(test, feature = "test-utilities"))]
pub mod mock_control_plane;

pub use config::ControllerConfig;
pub use context::{ControllerContext, TopicAssignment};
pub use deletion::{TopicDeletionCoordinator, TopicToBeDeleted};
pub use dispatcher::{
    ControlRequestBatch, ControlRequestSender, StopReplicaRequest, UpdateMetadataRequest,
};
pub use event_loop::{ControllerEventLoop, EventOutcome, event_channel};
pub use events::{ControllerEvent, StopReplicaPartitionResult, StopReplicaResponse};
pub use partition_state::{PartitionState, PartitionStateMachine};
pub use replica_state::{ReplicaState, ReplicaStateMachine};
pub use store::{CoordinationStore, DeletionIntent};

#[cfg(any(test, feature = "test-utilities"))]
pub use mock_control_plane::{InMemoryCoordinationStore, RecordingControlSender, SentRequest};
