//! Heartbeats and command-bus beans addressed to consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::item::ItemId;

/// Opaque consumer identity assigned by the messaging fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerId(pub Ulid);

impl ConsumerId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a consumer is currently taking items off its submission list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumerState {
    #[default]
    Running,
    Paused,
}

/// Periodic liveness broadcast from a running consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatBean {
    pub consumer_id: ConsumerId,
    /// Queue the consumer serves.
    pub consumer_name: String,
    pub publish_time: DateTime<Utc>,
    pub conception_time: DateTime<Utc>,
    /// Sequence number, starting at 1 for each consumer run.
    pub beat: u64,
    pub consumer_state: ConsumerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<ItemId>,
}

/// Pause or resume dequeuing on one consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseBean {
    pub consumer_id: ConsumerId,
    pub pause: bool,
}

impl PauseBean {
    pub fn new(consumer_id: ConsumerId, pause: bool) -> Self {
        Self { consumer_id, pause }
    }
}

/// Stop one consumer, terminating its running item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillBean {
    pub consumer_id: ConsumerId,
    pub disconnect: bool,
    pub exit_process: bool,
}

impl KillBean {
    pub fn new(consumer_id: ConsumerId, disconnect: bool, exit_process: bool) -> Self {
        Self {
            consumer_id,
            disconnect,
            exit_process,
        }
    }
}
