//! Queue naming conventions and the serializable queue descriptor.

use serde::{Deserialize, Serialize};

use crate::beans::ConsumerId;
use crate::status::QueueStatus;

pub const SUBMISSION_QUEUE_SUFFIX: &str = ".submission.queue";
pub const STATUS_SET_SUFFIX: &str = ".status.queue";
pub const STATUS_TOPIC_SUFFIX: &str = ".status.topic";
pub const HEARTBEAT_TOPIC_SUFFIX: &str = ".heartbeat.topic";
pub const COMMAND_SET_SUFFIX: &str = ".command.queue";
pub const COMMAND_TOPIC_SUFFIX: &str = ".command.topic";
pub const JOB_QUEUE_SUFFIX: &str = ".job-queue";
pub const ACTIVE_QUEUE_PREFIX: &str = ".aq-";
pub const ACTIVE_QUEUE_SUFFIX: &str = ".active-queue";

/// Id of the job queue under a name-root.
pub fn job_queue_id(root: &str) -> String {
    format!("{root}{JOB_QUEUE_SUFFIX}")
}

/// Id of the `n`th active queue under a name-root.
pub fn active_queue_id(root: &str, n: u64) -> String {
    format!("{root}{ACTIVE_QUEUE_PREFIX}{n}{ACTIVE_QUEUE_SUFFIX}")
}

/// Every list, set and topic name used by one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueNames {
    pub submission_queue: String,
    pub status_set: String,
    pub status_topic: String,
    pub heartbeat_topic: String,
    pub command_set: String,
    pub command_topic: String,
}

impl QueueNames {
    /// Derive all names as `root + <role-suffix>`.
    pub fn derive(root: &str) -> Self {
        Self {
            submission_queue: format!("{root}{SUBMISSION_QUEUE_SUFFIX}"),
            status_set: format!("{root}{STATUS_SET_SUFFIX}"),
            status_topic: format!("{root}{STATUS_TOPIC_SUFFIX}"),
            heartbeat_topic: format!("{root}{HEARTBEAT_TOPIC_SUFFIX}"),
            command_set: format!("{root}{COMMAND_SET_SUFFIX}"),
            command_topic: format!("{root}{COMMAND_TOPIC_SUFFIX}"),
        }
    }

    /// Use a shared heartbeat topic and command bus instead of per-queue ones.
    pub fn with_command_bus(
        mut self,
        heartbeat_topic: impl Into<String>,
        command_set: impl Into<String>,
        command_topic: impl Into<String>,
    ) -> Self {
        self.heartbeat_topic = heartbeat_topic.into();
        self.command_set = command_set.into();
        self.command_topic = command_topic.into();
        self
    }
}

/// Names shared by every queue of one service, derived from its name-root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNames {
    pub heartbeat_topic: String,
    pub command_set: String,
    pub command_topic: String,
    pub job_queue_id: String,
}

impl ServiceNames {
    pub fn derive(root: &str) -> Self {
        Self {
            heartbeat_topic: format!("{root}{HEARTBEAT_TOPIC_SUFFIX}"),
            command_set: format!("{root}{COMMAND_SET_SUFFIX}"),
            command_topic: format!("{root}{COMMAND_TOPIC_SUFFIX}"),
            job_queue_id: job_queue_id(root),
        }
    }

    /// Names for one of the service's queues, sharing the command bus.
    pub fn queue_names(&self, queue_id: &str) -> QueueNames {
        QueueNames::derive(queue_id).with_command_bus(
            &self.heartbeat_topic,
            &self.command_set,
            &self.command_topic,
        )
    }
}

/// Serializable snapshot of a queue, as returned by metadata lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDescriptor {
    pub queue_id: String,
    pub uri: String,
    pub names: QueueNames,
    pub consumer_id: ConsumerId,
    pub status: QueueStatus,
}
