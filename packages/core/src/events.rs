//! Messages carried over the event fabric's topics and channels.

use serde::{Deserialize, Serialize};

use crate::beans::{ConsumerId, HeartbeatBean, KillBean, PauseBean};
use crate::item::{ItemId, QueueItem};
use crate::request::QueueRequest;

/// Envelope for everything published on a topic or sent on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "bean", rename_all = "snake_case")]
pub enum FabricMessage {
    /// Item status update on a status topic.
    Item(QueueItem),
    Heartbeat(HeartbeatBean),
    Pause(PauseBean),
    Kill(KillBean),
    Request(QueueRequest),
}

impl FabricMessage {
    /// Consumer a heartbeat or command bean refers to.
    pub fn consumer_id(&self) -> Option<ConsumerId> {
        match self {
            FabricMessage::Heartbeat(beat) => Some(beat.consumer_id),
            FabricMessage::Pause(bean) => Some(bean.consumer_id),
            FabricMessage::Kill(bean) => Some(bean.consumer_id),
            FabricMessage::Item(_) | FabricMessage::Request(_) => None,
        }
    }

    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            FabricMessage::Item(item) => Some(item.id),
            FabricMessage::Request(request) => request.item_id,
            _ => None,
        }
    }

    /// Get a human-readable description of the message.
    pub fn description(&self) -> String {
        match self {
            FabricMessage::Item(item) => {
                format!("Item '{}' is {} ({:.0}%)", item.name, item.status, item.percent_complete)
            }
            FabricMessage::Heartbeat(beat) => {
                format!("Heartbeat #{} from consumer {}", beat.beat, beat.consumer_id)
            }
            FabricMessage::Pause(bean) if bean.pause => {
                format!("Pause consumer {}", bean.consumer_id)
            }
            FabricMessage::Pause(bean) => format!("Resume consumer {}", bean.consumer_id),
            FabricMessage::Kill(bean) => format!("Kill consumer {}", bean.consumer_id),
            FabricMessage::Request(request) => format!("{:?} request", request.request_type),
        }
    }
}
