//! Core domain types for the queue control plane.
//!
//! This crate contains shared types used across all packages:
//! - `QueueItem`, `Status` and the item kinds carried by queues
//! - `QueueStatus`, queue naming and `QueueDescriptor`
//! - Heartbeat and command beans for the command bus
//! - `QueueRequest` for the remote request/response channel
//! - `FabricMessage`, the envelope published on the messaging fabric
//! - `QueueError`, the error type shared by every layer

mod beans;
mod error;
mod events;
mod item;
mod queue;
mod request;
mod status;

pub use beans::{ConsumerId, ConsumerState, HeartbeatBean, KillBean, PauseBean};
pub use error::{QueueError, QueueResult};
pub use events::FabricMessage;
pub use item::{ItemId, ItemKind, ItemType, QueueItem};
pub use queue::{
    ACTIVE_QUEUE_PREFIX, ACTIVE_QUEUE_SUFFIX, COMMAND_SET_SUFFIX, COMMAND_TOPIC_SUFFIX,
    HEARTBEAT_TOPIC_SUFFIX, JOB_QUEUE_SUFFIX, QueueDescriptor, QueueNames, STATUS_SET_SUFFIX,
    STATUS_TOPIC_SUFFIX, SUBMISSION_QUEUE_SUFFIX, ServiceNames, active_queue_id, job_queue_id,
};
pub use request::{QueueRequest, QueueRequestType};
pub use status::{QueueStatus, Status};
