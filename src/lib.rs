//! # Topicreaper
//! Controller-side topic deletion coordination for partitioned log clusters.
//!
//! When an operator requests deletion of a topic, the elected controller
//! must asynchronously, reliably, and idempotently remove all replica data
//! on every hosting broker, then purge the topic from cluster metadata —
//! while tolerating broker failures, ongoing partition reassignments, and
//! controller failover. This crate implements that state machine.
//!
//! # Goals
//! - One topic at a time: deletions are strictly serialized, oldest intent
//!   first, so a stalled topic never lets a newer one jump the queue
//! - Event-driven: no timers, no polling — broker acknowledgements advance
//!   replicas, the cluster-membership signal surfaces dead brokers
//! - Restart-safe: the durable intent markers are the source of truth; a
//!   new controller rebuilds the queue and restarts in-flight deletions
//!
//! # Getting started
//!
//! Wire the coordinator to your durable store and broker transport through
//! the [`CoordinationStore`](controller::CoordinationStore) and
//! [`ControlRequestSender`](controller::ControlRequestSender) seams, then
//! run the event loop:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use topicreaper::controller::{
//!     ControllerConfig, ControllerContext, ControllerEventLoop,
//!     TopicDeletionCoordinator, event_channel,
//! };
//! # use topicreaper::controller::{CoordinationStore, ControlRequestSender};
//!
//! # async fn example(store: Arc<dyn CoordinationStore>, sender: Arc<dyn ControlRequestSender>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ControllerConfig::from_env()?;
//! let (events, rx) = event_channel();
//! // Hand `events` to the store watcher, the response transport,
//! // and the failure detector.
//!
//! let coordinator =
//!     TopicDeletionCoordinator::new(&config, ControllerContext::new(), store, sender);
//! let mut event_loop = ControllerEventLoop::new(&config, coordinator, rx);
//! event_loop.on_controller_election().await?;
//! event_loop.run().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod controller;
pub mod error;
pub mod telemetry;
pub mod types;

pub mod prelude {
    //! Common imports for embedding the deletion coordinator.
    pub use crate::controller::{
        ControllerConfig, ControllerContext, ControllerEvent, ControllerEventLoop,
        TopicDeletionCoordinator, TopicToBeDeleted, event_channel,
    };
    pub use crate::error::{ControllerError, ControllerResult};
    pub use crate::types::{BrokerId, ControllerEpoch, PartitionReplica, TopicPartition};
}
