//! Fabric interface, configuration and connection.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use queue_core::{ConsumerId, FabricMessage, ItemId, QueueError, QueueItem};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::memory::InMemoryFabric;

/// Boxed future returned by asynchronous fabric operations.
pub type FabricFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FabricError>> + Send + 'a>>;

/// Fabric configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// Transport address, e.g. `mem://beamline`.
    pub uri: String,
    /// Buffered messages per topic before slow subscribers lag.
    pub topic_capacity: usize,
    /// Pending requests per request channel.
    pub request_capacity: usize,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            uri: "mem://".to_string(),
            topic_capacity: 1024,
            request_capacity: 64,
        }
    }
}

impl FabricConfig {
    /// Create a config for an in-memory fabric.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_topic_capacity(mut self, capacity: usize) -> Self {
        self.topic_capacity = capacity.max(1);
        self
    }

    pub fn with_request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity.max(1);
        self
    }
}

/// Fabric errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FabricError {
    #[error("Fabric is disconnected")]
    Disconnected,
    #[error("Unsupported transport address: {0}")]
    UnsupportedScheme(String),
    #[error("No responder is serving channel {0}")]
    NoResponder(String),
    #[error("Request on channel {channel} timed out after {timeout_ms}ms")]
    Timeout { channel: String, timeout_ms: u64 },
    #[error("Channel {0} closed before a reply was sent")]
    Closed(String),
}

impl From<FabricError> for QueueError {
    fn from(err: FabricError) -> Self {
        match err {
            FabricError::Timeout { .. } => QueueError::Timeout(err.to_string()),
            _ => QueueError::Transport(err.to_string()),
        }
    }
}

/// A request received on a served channel, awaiting its reply.
#[derive(Debug)]
pub struct PendingRequest {
    pub message: FabricMessage,
    reply: oneshot::Sender<FabricMessage>,
}

impl PendingRequest {
    pub(crate) fn new(message: FabricMessage, reply: oneshot::Sender<FabricMessage>) -> Self {
        Self { message, reply }
    }

    /// Send the reply; fails if the requester has given up waiting.
    pub fn reply(self, message: FabricMessage) -> Result<(), FabricError> {
        self.reply
            .send(message)
            .map_err(|_| FabricError::Closed("reply".to_string()))
    }
}

/// The messaging fabric consumed by the control plane.
///
/// Lists are ordered and created on first use. Publication is
/// fire-and-forget: publishing to a topic with no subscribers succeeds.
pub trait EventFabric: Send + Sync + 'static {
    /// Transport address this fabric is connected to.
    fn uri(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Allocate a consumer identity for the queue called `name`.
    fn create_consumer(&self, name: &str) -> Result<ConsumerId, FabricError>;

    /// Forget a consumer identity.
    fn release_consumer(&self, consumer_id: ConsumerId);

    fn publish(&self, topic: &str, message: FabricMessage) -> Result<(), FabricError>;

    fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<FabricMessage>, FabricError>;

    fn append(&self, list: &str, item: QueueItem) -> Result<(), FabricError>;

    fn pop_front(&self, list: &str) -> Result<Option<QueueItem>, FabricError>;

    /// Remove by identity; `false` if the item is absent.
    fn remove(&self, list: &str, item_id: ItemId) -> Result<bool, FabricError>;

    /// Move an item `move_by` places toward the head (negative: toward the
    /// tail), clamped to the list bounds; `false` if the item is absent.
    fn reorder(&self, list: &str, item_id: ItemId, move_by: i32) -> Result<bool, FabricError>;

    /// Replace the entry with the same id, or append.
    fn upsert(&self, list: &str, item: QueueItem) -> Result<(), FabricError>;

    fn clear(&self, list: &str) -> Result<(), FabricError>;

    /// Forget a list entirely. A later use recreates it empty.
    fn drop_list(&self, list: &str);

    /// Forget a topic. Current subscribers see it close once no publisher
    /// holds it.
    fn drop_topic(&self, topic: &str);

    fn snapshot(&self, list: &str) -> Result<Vec<QueueItem>, FabricError>;

    fn find(&self, list: &str, item_id: ItemId) -> Result<Option<QueueItem>, FabricError> {
        Ok(self
            .snapshot(list)?
            .into_iter()
            .find(|item| item.id == item_id))
    }

    /// Send a request and wait up to `timeout` for the reply.
    fn request(
        &self,
        channel: &str,
        message: FabricMessage,
        timeout: Duration,
    ) -> FabricFuture<'_, FabricMessage>;

    /// Start answering requests on `channel`, replacing any previous responder.
    fn serve(&self, channel: &str) -> Result<mpsc::Receiver<PendingRequest>, FabricError>;

    /// Drop every topic, channel and consumer; later calls fail.
    fn disconnect(&self);
}

/// Connect to the fabric named by `config.uri`.
pub fn connect(config: FabricConfig) -> Result<Arc<dyn EventFabric>, FabricError> {
    if config.uri.starts_with("mem://") || config.uri == "memory" {
        tracing::info!("Connecting to in-memory fabric: {}", config.uri);
        return Ok(Arc::new(InMemoryFabric::new(config)));
    }
    Err(FabricError::UnsupportedScheme(config.uri))
}
