//! Request/response payload for remote metadata lookups.

use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::item::ItemId;
use crate::queue::QueueDescriptor;
use crate::status::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueRequestType {
    JobQueueId,
    CommandSet,
    CommandTopic,
    HeartbeatTopic,
    BeanStatus,
    Queue,
    ServiceStartStop,
}

/// A request and, once answered, its reply.
///
/// The responder fills in the field matching `request_type`, or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRequest {
    pub request_type: QueueRequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub start_queue_service: bool,
    #[serde(default)]
    pub stop_queue_service: bool,
    #[serde(default)]
    pub force_stop: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_queue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_set_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_topic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_topic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bean_status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<QueueError>,
}

impl QueueRequest {
    pub fn new(request_type: QueueRequestType) -> Self {
        Self {
            request_type,
            queue_id: None,
            item_id: None,
            start_queue_service: false,
            stop_queue_service: false,
            force_stop: false,
            job_queue_id: None,
            command_set_name: None,
            command_topic_name: None,
            heartbeat_topic_name: None,
            bean_status: None,
            queue: None,
            error: None,
        }
    }

    pub fn bean_status(item_id: ItemId, queue_id: impl Into<String>) -> Self {
        Self {
            item_id: Some(item_id),
            queue_id: Some(queue_id.into()),
            ..Self::new(QueueRequestType::BeanStatus)
        }
    }

    pub fn queue(queue_id: impl Into<String>) -> Self {
        Self {
            queue_id: Some(queue_id.into()),
            ..Self::new(QueueRequestType::Queue)
        }
    }

    pub fn start_service() -> Self {
        Self {
            start_queue_service: true,
            ..Self::new(QueueRequestType::ServiceStartStop)
        }
    }

    pub fn stop_service(force: bool) -> Self {
        Self {
            stop_queue_service: true,
            force_stop: force,
            ..Self::new(QueueRequestType::ServiceStartStop)
        }
    }

    /// Convert an answered request into its outcome.
    pub fn into_result(self) -> Result<Self, QueueError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}
