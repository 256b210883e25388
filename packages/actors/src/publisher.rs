//! Item status publication.

use std::sync::Arc;

use fabric::EventFabric;
use queue_core::{FabricMessage, ItemId, QueueItem, QueueNames, QueueResult, Status};

/// Writes item updates to a queue's status set and status topic.
#[derive(Clone)]
pub struct StatusPublisher {
    fabric: Arc<dyn EventFabric>,
    status_set: String,
    status_topic: String,
}

impl StatusPublisher {
    pub fn new(
        fabric: Arc<dyn EventFabric>,
        status_set: impl Into<String>,
        status_topic: impl Into<String>,
    ) -> Self {
        Self {
            fabric,
            status_set: status_set.into(),
            status_topic: status_topic.into(),
        }
    }

    pub fn for_queue(fabric: Arc<dyn EventFabric>, names: &QueueNames) -> Self {
        Self::new(fabric, &names.status_set, &names.status_topic)
    }

    /// Record the item in the status set, then publish it on the status topic.
    pub fn broadcast(&self, item: &QueueItem) -> QueueResult<()> {
        tracing::debug!(
            "Broadcasting {} for item {} on {}",
            item.status,
            item.id,
            self.status_topic
        );
        self.fabric.upsert(&self.status_set, item.clone())?;
        self.fabric
            .publish(&self.status_topic, FabricMessage::Item(item.clone()))?;
        Ok(())
    }

    /// A control request recorded in the status set and not yet acted on.
    pub fn pending_request(&self, item_id: ItemId) -> QueueResult<Option<Status>> {
        Ok(self
            .fabric
            .find(&self.status_set, item_id)?
            .map(|item| item.status)
            .filter(|status| status.is_request()))
    }

    pub fn status_set(&self) -> &str {
        &self.status_set
    }

    pub fn status_topic(&self) -> &str {
        &self.status_topic
    }
}

impl std::fmt::Debug for StatusPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPublisher")
            .field("status_set", &self.status_set)
            .field("status_topic", &self.status_topic)
            .finish()
    }
}
