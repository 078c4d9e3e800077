//! Outbound control requests to brokers.
//!
//! State transitions do not talk to brokers directly: they append typed
//! requests to a [`ControlRequestBatch`], and the coordinator flushes the
//! batch through a [`ControlRequestSender`] once the transition group is
//! complete. The batch enforces two rules the deletion protocol depends on:
//!
//! - a new batch may only be opened when the previous one was fully sent,
//! - on flush, `UpdateMetadata` goes out before any `StopReplica`, and for
//!   each broker the non-deleting stop precedes the deleting stop.
//!
//! Responses never come back through the sender: the transport enqueues a
//! `StopReplicaResponseReceived` event on the controller event channel.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ControllerError, ControllerResult};
use crate::types::{BrokerId, ControllerEpoch, TopicPartition};

/// Instructs brokers to update their metadata view of the given partitions.
///
/// During deletion the leader is the [`BrokerId::LEADER_DURING_DELETE`]
/// sentinel, which makes brokers refuse client traffic for the partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMetadataRequest {
    pub partitions: Vec<TopicPartition>,
    pub leader: BrokerId,
    pub epoch: ControllerEpoch,
}

/// Instructs one broker to stop serving the given partitions.
///
/// With `delete = false` the broker only stops fetching; with
/// `delete = true` it also removes the replica's persistent data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopReplicaRequest {
    pub partitions: Vec<TopicPartition>,
    pub delete: bool,
    pub epoch: ControllerEpoch,
}

/// Transport seam for outbound control requests.
///
/// Production wires this to the broker channel manager; tests use the
/// recording sender from the mock control plane.
#[async_trait]
pub trait ControlRequestSender: Send + Sync {
    /// Send one metadata update to a set of brokers.
    async fn send_update_metadata(
        &self,
        brokers: &[BrokerId],
        request: UpdateMetadataRequest,
    ) -> ControllerResult<()>;

    /// Send one stop-replica request to a single broker.
    async fn send_stop_replica(
        &self,
        broker_id: BrokerId,
        request: StopReplicaRequest,
    ) -> ControllerResult<()>;
}

#[derive(Debug, Clone)]
struct StagedUpdateMetadata {
    brokers: Vec<BrokerId>,
    partitions: Vec<TopicPartition>,
    leader: BrokerId,
}

/// Accumulates control requests for one transition group.
#[derive(Debug, Default)]
pub struct ControlRequestBatch {
    update_metadata: Vec<StagedUpdateMetadata>,
    /// Per broker: (partition, delete) pairs, brokers in ascending order.
    stop_replica: BTreeMap<BrokerId, Vec<(TopicPartition, bool)>>,
}

impl ControlRequestBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new batch.
    ///
    /// Fails if the previous batch still holds unsent requests, which would
    /// mean a transition group was started without flushing the last one.
    pub fn new_batch(&mut self) -> ControllerResult<()> {
        if !self.is_empty() {
            return Err(ControllerError::RequestBatch(
                "new batch opened while unsent requests are pending".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the batch holds no staged requests.
    pub fn is_empty(&self) -> bool {
        self.update_metadata.is_empty() && self.stop_replica.is_empty()
    }

    /// Drop all staged requests without sending them.
    pub fn clear(&mut self) {
        self.update_metadata.clear();
        self.stop_replica.clear();
    }

    /// Stage a metadata update for the given brokers and partitions.
    pub fn add_update_metadata_for_brokers(
        &mut self,
        brokers: Vec<BrokerId>,
        partitions: Vec<TopicPartition>,
        leader: BrokerId,
    ) {
        if brokers.is_empty() || partitions.is_empty() {
            return;
        }
        self.update_metadata.push(StagedUpdateMetadata {
            brokers,
            partitions,
            leader,
        });
    }

    /// Stage a stop-replica instruction for one replica.
    pub fn add_stop_replica(
        &mut self,
        broker_id: BrokerId,
        partition: TopicPartition,
        delete: bool,
    ) {
        self.stop_replica
            .entry(broker_id)
            .or_default()
            .push((partition, delete));
    }

    /// Flush every staged request through the sender, stamped with the
    /// given controller epoch, and leave the batch empty.
    ///
    /// `UpdateMetadata` is sent before any `StopReplica`; per broker, the
    /// `delete = false` group precedes the `delete = true` group. The batch
    /// is emptied even when the sender fails, so a fatal dispatch error
    /// does not wedge the next batch.
    pub async fn send(
        &mut self,
        sender: &dyn ControlRequestSender,
        epoch: ControllerEpoch,
    ) -> ControllerResult<()> {
        let update_metadata = std::mem::take(&mut self.update_metadata);
        let stop_replica = std::mem::take(&mut self.stop_replica);

        for staged in update_metadata {
            sender
                .send_update_metadata(
                    &staged.brokers,
                    UpdateMetadataRequest {
                        partitions: staged.partitions,
                        leader: staged.leader,
                        epoch,
                    },
                )
                .await?;
        }

        for (broker_id, entries) in stop_replica {
            for delete in [false, true] {
                let partitions: Vec<TopicPartition> = entries
                    .iter()
                    .filter(|(_, d)| *d == delete)
                    .map(|(p, _)| p.clone())
                    .collect();
                if partitions.is_empty() {
                    continue;
                }
                sender
                    .send_stop_replica(
                        broker_id,
                        StopReplicaRequest {
                            partitions,
                            delete,
                            epoch,
                        },
                    )
                    .await?;
            }
        }

        Ok(())
    }
}
