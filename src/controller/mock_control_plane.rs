//! In-memory control plane for testing.
//!
//! Provides a full-featured in-memory durable store and a recording request
//! sender, so the deletion coordinator can be exercised end to end without
//! a real coordination service or broker transport.
//!
//! # Usage
//!
//! This module is available when the `test-utilities` feature is enabled,
//! or during unit tests:
//!
//! ```toml
//! [dev-dependencies]
//! topicreaper = { path = ".", features = ["test-utilities"] }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, mpsc};

use crate::controller::dispatcher::{
    ControlRequestSender, StopReplicaRequest, UpdateMetadataRequest,
};
use crate::controller::events::{
    ControllerEvent, StopReplicaPartitionResult, StopReplicaResponse,
};
use crate::controller::store::{CoordinationStore, DeletionIntent};
use crate::error::{ControllerError, ControllerResult};
use crate::types::BrokerId;

/// In-memory stand-in for the durable coordination store.
///
/// Tracks which topic paths exist and supports failure injection for the
/// teardown write path.
#[derive(Debug, Default)]
pub struct InMemoryCoordinationStore {
    /// topic -> marker creation time (ms).
    intents: RwLock<HashMap<Arc<str>, u64>>,
    /// Topics whose `/brokers/topics/<t>` node exists.
    topic_metadata: RwLock<HashSet<Arc<str>>>,
    /// Topics whose `/config/topics/<t>` node exists.
    topic_configs: RwLock<HashSet<Arc<str>>>,
    /// Topics with a registered partition-modifications watch.
    watches: RwLock<HashSet<Arc<str>>>,
    /// When set, metadata deletes fail, simulating a store outage.
    fail_metadata_deletes: AtomicBool,
}

impl InMemoryCoordinationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the metadata, config, and watch entries a registered topic
    /// has before deletion starts.
    pub async fn register_topic(&self, topic: impl Into<Arc<str>>) {
        let topic = topic.into();
        self.topic_metadata.write().await.insert(Arc::clone(&topic));
        self.topic_configs.write().await.insert(Arc::clone(&topic));
        self.watches.write().await.insert(topic);
    }

    /// Write a deletion-intent marker, as the operator CLI would.
    pub async fn create_deletion_intent(&self, topic: impl Into<Arc<str>>, created_at_ms: u64) {
        self.intents.write().await.insert(topic.into(), created_at_ms);
    }

    /// Make subsequent metadata deletes fail.
    pub fn set_fail_metadata_deletes(&self, fail: bool) {
        self.fail_metadata_deletes.store(fail, Ordering::SeqCst);
    }

    /// Whether the deletion-intent marker exists.
    pub async fn has_deletion_intent(&self, topic: &str) -> bool {
        self.intents.read().await.contains_key(topic)
    }

    /// Whether the topic metadata node exists.
    pub async fn has_topic_metadata(&self, topic: &str) -> bool {
        self.topic_metadata.read().await.contains(topic)
    }

    /// Whether the topic config node exists.
    pub async fn has_topic_config(&self, topic: &str) -> bool {
        self.topic_configs.read().await.contains(topic)
    }

    /// Whether the partition-modifications watch is still registered.
    pub async fn has_partition_watch(&self, topic: &str) -> bool {
        self.watches.read().await.contains(topic)
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn list_deletion_intents(&self) -> ControllerResult<Vec<DeletionIntent>> {
        let mut intents: Vec<DeletionIntent> = self
            .intents
            .read()
            .await
            .iter()
            .map(|(topic, created_at_ms)| DeletionIntent {
                topic: Arc::clone(topic),
                created_at_ms: *created_at_ms,
            })
            .collect();
        intents.sort_by(|a, b| {
            (a.created_at_ms, a.topic.as_ref()).cmp(&(b.created_at_ms, b.topic.as_ref()))
        });
        Ok(intents)
    }

    async fn read_deletion_intent(&self, topic: &str) -> ControllerResult<Option<DeletionIntent>> {
        Ok(self
            .intents
            .read()
            .await
            .get_key_value(topic)
            .map(|(name, created_at_ms)| DeletionIntent {
                topic: Arc::clone(name),
                created_at_ms: *created_at_ms,
            }))
    }

    async fn delete_deletion_intent(&self, topic: &str) -> ControllerResult<()> {
        self.intents.write().await.remove(topic);
        Ok(())
    }

    async fn delete_topic_metadata(&self, topic: &str) -> ControllerResult<()> {
        if self.fail_metadata_deletes.load(Ordering::SeqCst) {
            return Err(ControllerError::Store(format!(
                "failed to delete {}: store unavailable",
                crate::controller::store::topic_metadata_path(topic)
            )));
        }
        self.topic_metadata.write().await.remove(topic);
        Ok(())
    }

    async fn delete_topic_config(&self, topic: &str) -> ControllerResult<()> {
        self.topic_configs.write().await.remove(topic);
        Ok(())
    }

    async fn deregister_partition_modifications_watch(&self, topic: &str) -> ControllerResult<()> {
        self.watches.write().await.remove(topic);
        Ok(())
    }
}

/// A request recorded by [`RecordingControlSender`].
#[derive(Debug, Clone)]
pub enum SentRequest {
    UpdateMetadata {
        brokers: Vec<BrokerId>,
        request: UpdateMetadataRequest,
    },
    StopReplica {
        broker_id: BrokerId,
        request: StopReplicaRequest,
    },
}

/// Records every outbound control request, optionally answering
/// stop-replica deletes with synthesized response events.
///
/// With an event channel attached and auto-ack enabled, each
/// `StopReplica(delete = true)` immediately enqueues a
/// `StopReplicaResponseReceived` carrying the request's epoch; brokers in
/// the failure set answer with a per-partition error instead.
#[derive(Default)]
pub struct RecordingControlSender {
    sent: Mutex<Vec<SentRequest>>,
    events: Option<mpsc::UnboundedSender<ControllerEvent>>,
    auto_ack: AtomicBool,
    failing_brokers: Mutex<HashSet<BrokerId>>,
}

impl RecordingControlSender {
    /// A sender that only records.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender that records and auto-acks deletes onto the given event
    /// channel.
    pub fn with_auto_ack(events: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            events: Some(events),
            auto_ack: AtomicBool::new(true),
            failing_brokers: Mutex::new(HashSet::new()),
        }
    }

    /// Enable or disable auto-acking.
    pub fn set_auto_ack(&self, enabled: bool) {
        self.auto_ack.store(enabled, Ordering::SeqCst);
    }

    /// Make the given broker answer deletes with an error.
    pub async fn fail_broker(&self, broker_id: BrokerId) {
        self.failing_brokers.lock().await.insert(broker_id);
    }

    /// Let the given broker answer deletes successfully again.
    pub async fn heal_broker(&self, broker_id: BrokerId) {
        self.failing_brokers.lock().await.remove(&broker_id);
    }

    /// Everything sent so far, in send order.
    pub async fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().await.clone()
    }

    /// Stop-replica requests with `delete = true`, in send order.
    pub async fn sent_deletes(&self) -> Vec<(BrokerId, StopReplicaRequest)> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|r| match r {
                SentRequest::StopReplica { broker_id, request } if request.delete => {
                    Some((*broker_id, request.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Metadata updates sent so far, in send order.
    pub async fn sent_metadata_updates(&self) -> Vec<(Vec<BrokerId>, UpdateMetadataRequest)> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|r| match r {
                SentRequest::UpdateMetadata { brokers, request } => {
                    Some((brokers.clone(), request.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Forget everything recorded so far.
    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl ControlRequestSender for RecordingControlSender {
    async fn send_update_metadata(
        &self,
        brokers: &[BrokerId],
        request: UpdateMetadataRequest,
    ) -> ControllerResult<()> {
        self.sent.lock().await.push(SentRequest::UpdateMetadata {
            brokers: brokers.to_vec(),
            request,
        });
        Ok(())
    }

    async fn send_stop_replica(
        &self,
        broker_id: BrokerId,
        request: StopReplicaRequest,
    ) -> ControllerResult<()> {
        self.sent.lock().await.push(SentRequest::StopReplica {
            broker_id,
            request: request.clone(),
        });

        if request.delete
            && self.auto_ack.load(Ordering::SeqCst)
            && let Some(events) = &self.events
        {
            let failing = self.failing_brokers.lock().await.contains(&broker_id);
            let partitions = request
                .partitions
                .into_iter()
                .map(|partition| {
                    if failing {
                        StopReplicaPartitionResult::failed(partition, "replica unavailable")
                    } else {
                        StopReplicaPartitionResult::ok(partition)
                    }
                })
                .collect();
            events
                .send(ControllerEvent::StopReplicaResponseReceived {
                    broker_id,
                    epoch: request.epoch,
                    response: StopReplicaResponse { partitions },
                })
                .map_err(|e| ControllerError::Dispatch(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TopicPartition;

    #[tokio::test]
    async fn test_store_paths_lifecycle() {
        let store = InMemoryCoordinationStore::new();
        store.register_topic("orders").await;
        store.create_deletion_intent("orders", 42).await;

        assert!(store.has_topic_metadata("orders").await);
        assert!(store.has_deletion_intent("orders").await);

        let intents = store.list_deletion_intents().await.unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].created_at_ms, 42);

        store.delete_topic_metadata("orders").await.unwrap();
        store.delete_topic_config("orders").await.unwrap();
        store.delete_deletion_intent("orders").await.unwrap();
        store
            .deregister_partition_modifications_watch("orders")
            .await
            .unwrap();

        assert!(!store.has_topic_metadata("orders").await);
        assert!(!store.has_topic_config("orders").await);
        assert!(!store.has_deletion_intent("orders").await);
        assert!(!store.has_partition_watch("orders").await);
    }

    #[tokio::test]
    async fn test_store_failure_injection() {
        let store = InMemoryCoordinationStore::new();
        store.register_topic("orders").await;
        store.set_fail_metadata_deletes(true);

        let err = store.delete_topic_metadata("orders").await.unwrap_err();
        assert!(matches!(err, ControllerError::Store(_)));
        assert!(store.has_topic_metadata("orders").await);

        store.set_fail_metadata_deletes(false);
        store.delete_topic_metadata("orders").await.unwrap();
        assert!(!store.has_topic_metadata("orders").await);
    }

    #[tokio::test]
    async fn test_auto_ack_synthesizes_responses() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = RecordingControlSender::with_auto_ack(tx);
        sender.fail_broker(BrokerId(2)).await;

        let request = StopReplicaRequest {
            partitions: vec![TopicPartition::new("orders", 0)],
            delete: true,
            epoch: crate::types::ControllerEpoch::new(3),
        };
        sender
            .send_stop_replica(BrokerId(1), request.clone())
            .await
            .unwrap();
        sender.send_stop_replica(BrokerId(2), request).await.unwrap();

        match rx.try_recv().unwrap() {
            ControllerEvent::StopReplicaResponseReceived {
                broker_id,
                epoch,
                response,
            } => {
                assert_eq!(broker_id, BrokerId(1));
                assert_eq!(epoch.value(), 3);
                assert!(response.partitions[0].is_ok());
            }
            other => panic!("Unexpected event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            ControllerEvent::StopReplicaResponseReceived { broker_id, response, .. } => {
                assert_eq!(broker_id, BrokerId(2));
                assert!(!response.partitions[0].is_ok());
            }
            other => panic!("Unexpected event: {other:?}"),
        }

        assert_eq!(sender.sent_deletes().await.len(), 2);
    }
}
