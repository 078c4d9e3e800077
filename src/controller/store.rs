//! Gateway to the durable coordination store.
//!
//! The controller publishes and consumes deletion state through a
//! hierarchical key-value service with watches. This module owns the path
//! layout and the narrow trait the deletion coordinator needs; the store
//! itself (connection handling, watches, sessions) is an external
//! collaborator behind the trait.
//!
//! # Path Layout
//!
//! The layout is significant for cross-version compatibility:
//!
//! - `/admin/delete_topics/<topic>` — deletion-intent marker. Created by the
//!   operator CLI, watched by the controller, deleted only at the end of
//!   topic teardown. Its creation time orders the deletion queue.
//! - `/brokers/topics/<topic>` — topic metadata, deleted recursively at
//!   teardown.
//! - `/config/topics/<topic>` — topic configuration, deleted recursively at
//!   teardown.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ControllerResult;

/// Root path for deletion-intent markers.
pub const DELETE_TOPICS_PATH: &str = "/admin/delete_topics";

/// Root path for topic metadata.
pub const BROKER_TOPICS_PATH: &str = "/brokers/topics";

/// Root path for topic configuration.
pub const CONFIG_TOPICS_PATH: &str = "/config/topics";

/// Path of the deletion-intent marker for a topic.
pub fn deletion_intent_path(topic: &str) -> String {
    format!("{DELETE_TOPICS_PATH}/{topic}")
}

/// Path of the metadata node for a topic.
pub fn topic_metadata_path(topic: &str) -> String {
    format!("{BROKER_TOPICS_PATH}/{topic}")
}

/// Path of the configuration node for a topic.
pub fn topic_config_path(topic: &str) -> String {
    format!("{CONFIG_TOPICS_PATH}/{topic}")
}

/// A pending deletion recorded in the durable store.
///
/// `created_at_ms` is the marker node's creation time; it survives
/// controller failover and is the authoritative FIFO key for the deletion
/// queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionIntent {
    pub topic: Arc<str>,
    pub created_at_ms: u64,
}

/// The durable-store operations the deletion coordinator depends on.
///
/// All deletes are idempotent: removing an absent node succeeds.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// All deletion-intent markers currently present.
    async fn list_deletion_intents(&self) -> ControllerResult<Vec<DeletionIntent>>;

    /// The deletion-intent marker for one topic, if present.
    async fn read_deletion_intent(&self, topic: &str) -> ControllerResult<Option<DeletionIntent>>;

    /// Remove the deletion-intent marker for a topic.
    async fn delete_deletion_intent(&self, topic: &str) -> ControllerResult<()>;

    /// Recursively remove the topic's metadata node.
    async fn delete_topic_metadata(&self, topic: &str) -> ControllerResult<()>;

    /// Recursively remove the topic's configuration node.
    async fn delete_topic_config(&self, topic: &str) -> ControllerResult<()>;

    /// Stop watching the topic's metadata for partition changes.
    ///
    /// Must happen before the metadata node is deleted, so a re-created
    /// topic of the same name cannot fire the old watch.
    async fn deregister_partition_modifications_watch(&self, topic: &str) -> ControllerResult<()>;
}
