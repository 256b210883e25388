//! Queue metadata lookups, answered in-process or over a request channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fabric::EventFabric;
use queue_core::{
    FabricMessage, ItemId, QueueDescriptor, QueueError, QueueNames, QueueRequest,
    QueueRequestType, QueueResult, Status,
};

use crate::config::ServiceConfig;
use crate::service::QueueService;

/// Source of the metadata a controller needs before it can address a queue.
pub trait MetadataResolver: Send + Sync {
    fn job_queue_id(&self) -> impl Future<Output = QueueResult<String>> + Send;

    fn command_set_name(&self) -> impl Future<Output = QueueResult<String>> + Send;

    fn command_topic_name(&self) -> impl Future<Output = QueueResult<String>> + Send;

    fn heartbeat_topic_name(&self) -> impl Future<Output = QueueResult<String>> + Send;

    /// Descriptor of the job queue or a registered active queue.
    fn queue(&self, queue_id: &str) -> impl Future<Output = QueueResult<QueueDescriptor>> + Send;

    /// Current status of an item in a queue's status set or submission list.
    fn bean_status(
        &self,
        item_id: ItemId,
        queue_id: &str,
    ) -> impl Future<Output = QueueResult<Status>> + Send;

    fn start_service(&self) -> impl Future<Output = QueueResult<()>> + Send;

    fn stop_service(&self, force: bool) -> impl Future<Output = QueueResult<()>> + Send;
}

/// Look up an item's status: the status set first, then the submission list.
pub fn find_bean_status(
    fabric: &dyn EventFabric,
    names: &QueueNames,
    item_id: ItemId,
) -> QueueResult<Status> {
    if let Some(item) = fabric.find(&names.status_set, item_id)? {
        return Ok(item.status);
    }
    if let Some(item) = fabric.find(&names.submission_queue, item_id)? {
        return Ok(item.status);
    }
    tracing::debug!("Item {} is in neither {} nor {}", item_id, names.status_set, names.submission_queue);
    Err(QueueError::NotFound(format!(
        "item {} is not in the submission list or status set",
        item_id
    )))
}

/// Resolves metadata with direct calls on a service in the same process.
#[derive(Debug, Clone)]
pub struct LocalResolver {
    service: QueueService,
}

impl LocalResolver {
    pub fn new(service: QueueService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &QueueService {
        &self.service
    }
}

impl MetadataResolver for LocalResolver {
    async fn job_queue_id(&self) -> QueueResult<String> {
        self.service.get_job_queue_id().await
    }

    async fn command_set_name(&self) -> QueueResult<String> {
        self.service.get_command_set_name().await
    }

    async fn command_topic_name(&self) -> QueueResult<String> {
        self.service.get_command_topic_name().await
    }

    async fn heartbeat_topic_name(&self) -> QueueResult<String> {
        self.service.get_heartbeat_topic_name().await
    }

    async fn queue(&self, queue_id: &str) -> QueueResult<QueueDescriptor> {
        Ok(self.service.get_queue(queue_id).await?.descriptor())
    }

    async fn bean_status(&self, item_id: ItemId, queue_id: &str) -> QueueResult<Status> {
        let queue = self.service.get_queue(queue_id).await?;
        find_bean_status(queue.fabric().as_ref(), queue.names(), item_id)
    }

    async fn start_service(&self) -> QueueResult<()> {
        self.service.start().await
    }

    async fn stop_service(&self, force: bool) -> QueueResult<()> {
        self.service.stop(force).await
    }
}

/// Resolves metadata by sending [`QueueRequest`]s to a
/// [`QueueResponder`](crate::QueueResponder) on a request channel.
#[derive(Clone)]
pub struct RemoteResolver {
    fabric: Arc<dyn EventFabric>,
    channel: String,
    timeout: Duration,
}

impl RemoteResolver {
    pub fn new(fabric: Arc<dyn EventFabric>, channel: impl Into<String>, timeout: Duration) -> Self {
        Self {
            fabric,
            channel: channel.into(),
            timeout,
        }
    }

    pub fn from_config(fabric: Arc<dyn EventFabric>, config: &ServiceConfig) -> Self {
        Self::new(fabric, config.request_channel.clone(), config.request_timeout())
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request and return the answered copy, or the error it carries.
    pub async fn send(&self, request: QueueRequest) -> QueueResult<QueueRequest> {
        let request_type = request.request_type;
        tracing::debug!("Sending {:?} request on {}", request_type, self.channel);
        let reply = self
            .fabric
            .request(&self.channel, FabricMessage::Request(request), self.timeout)
            .await?;
        match reply {
            FabricMessage::Request(reply) if reply.request_type == request_type => reply.into_result(),
            other => Err(QueueError::Transport(format!(
                "unexpected reply to {:?} request: {}",
                request_type,
                other.description()
            ))),
        }
    }

    async fn send_for<T>(
        &self,
        request: QueueRequest,
        field: impl FnOnce(QueueRequest) -> Option<T>,
    ) -> QueueResult<T> {
        let request_type = request.request_type;
        field(self.send(request).await?).ok_or_else(|| {
            QueueError::Transport(format!("reply to {:?} request is missing its value", request_type))
        })
    }
}

impl MetadataResolver for RemoteResolver {
    async fn job_queue_id(&self) -> QueueResult<String> {
        self.send_for(QueueRequest::new(QueueRequestType::JobQueueId), |reply| reply.job_queue_id)
            .await
    }

    async fn command_set_name(&self) -> QueueResult<String> {
        self.send_for(QueueRequest::new(QueueRequestType::CommandSet), |reply| {
            reply.command_set_name
        })
        .await
    }

    async fn command_topic_name(&self) -> QueueResult<String> {
        self.send_for(QueueRequest::new(QueueRequestType::CommandTopic), |reply| {
            reply.command_topic_name
        })
        .await
    }

    async fn heartbeat_topic_name(&self) -> QueueResult<String> {
        self.send_for(QueueRequest::new(QueueRequestType::HeartbeatTopic), |reply| {
            reply.heartbeat_topic_name
        })
        .await
    }

    async fn queue(&self, queue_id: &str) -> QueueResult<QueueDescriptor> {
        self.send_for(QueueRequest::queue(queue_id), |reply| reply.queue)
            .await
    }

    async fn bean_status(&self, item_id: ItemId, queue_id: &str) -> QueueResult<Status> {
        self.send_for(QueueRequest::bean_status(item_id, queue_id), |reply| {
            reply.bean_status
        })
        .await
    }

    async fn start_service(&self) -> QueueResult<()> {
        self.send(QueueRequest::start_service()).await.map(|_| ())
    }

    async fn stop_service(&self, force: bool) -> QueueResult<()> {
        self.send(QueueRequest::stop_service(force)).await.map(|_| ())
    }
}

impl std::fmt::Debug for RemoteResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteResolver")
            .field("channel", &self.channel)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
