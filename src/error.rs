//! Error types for controller operations.
//!
//! # Error Handling Patterns
//!
//! Two patterns apply, based on who can act on the failure:
//!
//! ## Fail-Fast (Propagate Errors)
//!
//! Used where a failure means the controller's view of the cluster can no
//! longer be trusted:
//! - Durable-store writes during topic teardown
//! - Illegal state transitions (these indicate a coordinator bug)
//! - Opening a request batch that still holds unsent requests
//!
//! The event loop treats these as fatal: it logs, resigns the controller,
//! and lets the next elected node rebuild from the durable store.
//!
//! ## Absorb and Reclassify
//!
//! Broker-side failures (stop-replica error responses, broker death) are not
//! errors at this layer at all: they become `ReplicaDeletionIneligible`
//! state and an ineligible topic, and are retried when the cluster recovers.
//! Operators observe progress only through the disappearance of the topic's
//! durable-store paths.

use thiserror::Error;

use crate::types::{PartitionReplica, TopicPartition};

/// Result type for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Errors that can occur in the controller's deletion subsystem.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A replica was asked to enter a state its current state does not
    /// permit.
    #[error("illegal replica state transition {from} -> {to} for {replica}")]
    IllegalReplicaTransition {
        replica: PartitionReplica,
        from: &'static str,
        to: &'static str,
    },

    /// A partition was asked to enter a state its current state does not
    /// permit.
    #[error("illegal partition state transition {from} -> {to} for {partition}")]
    IllegalPartitionTransition {
        partition: TopicPartition,
        from: &'static str,
        to: &'static str,
    },

    /// The control-request batch was misused (e.g. opened while non-empty).
    #[error("request batch error: {0}")]
    RequestBatch(String),

    /// Error from the durable coordination store.
    #[error("coordination store error: {0}")]
    Store(String),

    /// Error from the outbound request layer.
    #[error("request dispatch error: {0}")]
    Dispatch(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
