//! Client-facing queue controller.

use std::sync::Arc;
use std::time::Duration;

use actors::StatusPublisher;
use fabric::EventFabric;
use queue_core::{
    FabricMessage, ItemKind, KillBean, PauseBean, QueueDescriptor, QueueError, QueueItem,
    QueueResult, Status,
};
use tokio::sync::broadcast;

use crate::resolver::{LocalResolver, MetadataResolver, RemoteResolver};
use crate::service::QueueService;

/// Controller that resolves metadata through the service in this process.
pub type LocalQueueController = QueueController<LocalResolver>;

/// Controller that resolves metadata over a request channel.
pub type RemoteQueueController = QueueController<RemoteResolver>;

/// Validates and addresses client operations on queues and their items.
///
/// Item and queue control is published on the fabric; only the metadata
/// needed to address it goes through the resolver.
#[derive(Clone)]
pub struct QueueController<R> {
    resolver: R,
    fabric: Arc<dyn EventFabric>,
}

impl QueueController<LocalResolver> {
    pub fn local(service: QueueService) -> Self {
        let fabric = service.fabric();
        Self::new(LocalResolver::new(service), fabric)
    }
}

impl QueueController<RemoteResolver> {
    pub fn remote(fabric: Arc<dyn EventFabric>, channel: impl Into<String>, timeout: Duration) -> Self {
        let resolver = RemoteResolver::new(Arc::clone(&fabric), channel, timeout);
        Self::new(resolver, fabric)
    }
}

impl<R: MetadataResolver> QueueController<R> {
    pub fn new(resolver: R, fabric: Arc<dyn EventFabric>) -> Self {
        Self { resolver, fabric }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Fail unless `item` may be placed in the queue `queue_id`.
    async fn check_kind(&self, item: &QueueItem, queue_id: &str) -> QueueResult<()> {
        let job_queue_id = self.resolver.job_queue_id().await?;
        let expected = if queue_id == job_queue_id {
            ItemKind::TopLevel
        } else {
            ItemKind::Atom
        };
        if item.kind() != expected {
            tracing::error!(
                "Item {} is a {} and cannot be placed in {}",
                item.id,
                item.kind(),
                queue_id
            );
            return Err(QueueError::Validation(format!(
                "{} item {} is a {}; queue {} only accepts a {}",
                item.item_type,
                item.id,
                item.kind(),
                queue_id,
                expected
            )));
        }
        Ok(())
    }

    /// Append `item` to the queue's submission list as `SUBMITTED`.
    pub async fn submit(&self, item: &QueueItem, queue_id: &str) -> QueueResult<()> {
        self.check_kind(item, queue_id).await?;
        let queue = self.resolver.queue(queue_id).await?;
        let list = &queue.names.submission_queue;
        if self.fabric.find(list, item.id)?.is_some() {
            tracing::error!("Item {} is already submitted to {}", item.id, queue_id);
            return Err(QueueError::IllegalState(format!(
                "item {} is already in the submission list of {}",
                item.id, queue_id
            )));
        }

        let mut submitted = item.clone();
        submitted.set_status(Status::Submitted);
        self.fabric.append(list, submitted)?;
        tracing::info!("Submitted item {} to {}", item.id, queue_id);
        Ok(())
    }

    /// Take a not-yet-started item off the submission list.
    pub async fn remove(&self, item: &QueueItem, queue_id: &str) -> QueueResult<()> {
        self.check_kind(item, queue_id).await?;
        let queue = self.resolver.queue(queue_id).await?;
        if !self.fabric.remove(&queue.names.submission_queue, item.id)? {
            tracing::error!("Item {} is not in the submission list of {}", item.id, queue_id);
            return Err(QueueError::NotFound(format!(
                "item {} is not in the submission list of {}",
                item.id, queue_id
            )));
        }
        tracing::info!("Removed item {} from {}", item.id, queue_id);
        Ok(())
    }

    /// Shift a submitted item `move_by` places toward the head of the list.
    pub async fn reorder(&self, item: &QueueItem, move_by: i32, queue_id: &str) -> QueueResult<()> {
        self.check_kind(item, queue_id).await?;
        let queue = self.resolver.queue(queue_id).await?;
        if !self
            .fabric
            .reorder(&queue.names.submission_queue, item.id, move_by)?
        {
            tracing::error!("Item {} is not in the submission list of {}", item.id, queue_id);
            return Err(QueueError::NotFound(format!(
                "item {} is not in the submission list of {}",
                item.id, queue_id
            )));
        }
        tracing::debug!("Moved item {} by {} in {}", item.id, move_by, queue_id);
        Ok(())
    }

    pub async fn pause(&self, item: &QueueItem, queue_id: &str) -> QueueResult<()> {
        self.request_transition(item, queue_id, Status::Running, Status::RequestPause)
            .await
    }

    pub async fn resume(&self, item: &QueueItem, queue_id: &str) -> QueueResult<()> {
        self.request_transition(item, queue_id, Status::Paused, Status::RequestResume)
            .await
    }

    pub async fn terminate(&self, item: &QueueItem, queue_id: &str) -> QueueResult<()> {
        self.request_transition(item, queue_id, Status::Running, Status::RequestTerminate)
            .await
    }

    /// Publish `request` for an item currently in `required`.
    async fn request_transition(
        &self,
        item: &QueueItem,
        queue_id: &str,
        required: Status,
        request: Status,
    ) -> QueueResult<()> {
        self.check_kind(item, queue_id).await?;
        let current = self.resolver.bean_status(item.id, queue_id).await?;
        if current != required {
            tracing::error!(
                "Cannot request {} for item {}: it is {}, not {}",
                request,
                item.id,
                current,
                required
            );
            return Err(QueueError::IllegalState(format!(
                "item {} is {}; {} requires {}",
                item.id, current, request, required
            )));
        }

        let queue = self.resolver.queue(queue_id).await?;
        let mut requested = self
            .fabric
            .find(&queue.names.status_set, item.id)?
            .unwrap_or_else(|| item.clone());
        requested.set_status(request);
        StatusPublisher::for_queue(Arc::clone(&self.fabric), &queue.names).broadcast(&requested)?;
        tracing::info!("Requested {} for item {} in {}", request, item.id, queue_id);
        Ok(())
    }

    /// Stop the queue's consumer taking further items; the running one continues.
    pub async fn pause_queue(&self, queue_id: &str) -> QueueResult<()> {
        self.publish_pause(queue_id, true).await
    }

    pub async fn resume_queue(&self, queue_id: &str) -> QueueResult<()> {
        self.publish_pause(queue_id, false).await
    }

    async fn publish_pause(&self, queue_id: &str, pause: bool) -> QueueResult<()> {
        let queue = self.resolver.queue(queue_id).await?;
        let topic = self.resolver.command_topic_name().await?;
        let bean = PauseBean::new(queue.consumer_id, pause);
        self.fabric.publish(&topic, FabricMessage::Pause(bean))?;
        tracing::info!(
            "Published {} for consumer {} of {}",
            if pause { "pause" } else { "resume" },
            queue.consumer_id,
            queue_id
        );
        Ok(())
    }

    /// Publish a kill command to the queue's consumer.
    pub async fn kill_queue(
        &self,
        queue_id: &str,
        disconnect: bool,
        exit_process: bool,
    ) -> QueueResult<()> {
        let queue = self.resolver.queue(queue_id).await?;
        let topic = self.resolver.command_topic_name().await?;
        let bean = KillBean::new(queue.consumer_id, disconnect, exit_process);
        self.fabric.publish(&topic, FabricMessage::Kill(bean))?;
        tracing::info!("Published kill for consumer {} of {}", queue.consumer_id, queue_id);
        Ok(())
    }

    pub async fn start(&self) -> QueueResult<()> {
        self.resolver.start_service().await
    }

    pub async fn stop(&self, force: bool) -> QueueResult<()> {
        self.resolver.stop_service(force).await
    }

    /// Receive every item update published on the queue's status topic.
    pub async fn subscribe(&self, queue_id: &str) -> QueueResult<broadcast::Receiver<FabricMessage>> {
        let queue = self.resolver.queue(queue_id).await?;
        Ok(self.fabric.subscribe(&queue.names.status_topic)?)
    }

    pub async fn job_queue_id(&self) -> QueueResult<String> {
        self.resolver.job_queue_id().await
    }

    pub async fn command_topic_name(&self) -> QueueResult<String> {
        self.resolver.command_topic_name().await
    }

    pub async fn heartbeat_topic_name(&self) -> QueueResult<String> {
        self.resolver.heartbeat_topic_name().await
    }

    pub async fn queue(&self, queue_id: &str) -> QueueResult<QueueDescriptor> {
        self.resolver.queue(queue_id).await
    }

    pub async fn bean_status(&self, item: &QueueItem, queue_id: &str) -> QueueResult<Status> {
        self.resolver.bean_status(item.id, queue_id).await
    }

    pub async fn submission_list(&self, queue_id: &str) -> QueueResult<Vec<QueueItem>> {
        let queue = self.resolver.queue(queue_id).await?;
        Ok(self.fabric.snapshot(&queue.names.submission_queue)?)
    }

    pub async fn status_set(&self, queue_id: &str) -> QueueResult<Vec<QueueItem>> {
        let queue = self.resolver.queue(queue_id).await?;
        Ok(self.fabric.snapshot(&queue.names.status_set)?)
    }
}

impl<R: std::fmt::Debug> std::fmt::Debug for QueueController<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueController")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}
