//! Serves remote metadata requests from a live service.

use queue_core::{FabricMessage, QueueError, QueueRequest, QueueRequestType, QueueResult};
use tokio::task::JoinHandle;

use crate::resolver::{LocalResolver, MetadataResolver};
use crate::service::QueueService;

/// Answers [`QueueRequest`]s on a request channel on behalf of a service.
///
/// Each request is answered on its own task, so a slow service stop does
/// not hold up status lookups.
pub struct QueueResponder {
    channel: String,
    task: JoinHandle<()>,
}

impl QueueResponder {
    /// Start serving `channel`, replacing any previous responder on it.
    pub fn spawn(service: QueueService, channel: impl Into<String>) -> QueueResult<Self> {
        let channel = channel.into();
        let mut requests = service.fabric().serve(&channel)?;
        let resolver = LocalResolver::new(service);
        tracing::info!("Serving queue requests on {}", channel);

        let serving = channel.clone();
        let task = tokio::spawn(async move {
            while let Some(pending) = requests.recv().await {
                let FabricMessage::Request(request) = pending.message.clone() else {
                    tracing::warn!(
                        "Ignoring non-request message on {}: {}",
                        serving,
                        pending.message.description()
                    );
                    continue;
                };
                let resolver = resolver.clone();
                tokio::spawn(async move {
                    let reply = answer(&resolver, request).await;
                    if pending.reply(FabricMessage::Request(reply)).is_err() {
                        tracing::debug!("Requester gave up before the reply was sent");
                    }
                });
            }
            tracing::info!("Request channel {} closed", serving);
        });

        Ok(Self { channel, task })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for QueueResponder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for QueueResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueResponder")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Fill in the reply field for the request's type, or its error.
pub async fn answer<R: MetadataResolver>(resolver: &R, mut request: QueueRequest) -> QueueRequest {
    if let Err(err) = fill_reply(resolver, &mut request).await {
        tracing::warn!("{:?} request failed: {}", request.request_type, err);
        request.error = Some(err);
    }
    request
}

async fn fill_reply<R: MetadataResolver>(resolver: &R, request: &mut QueueRequest) -> QueueResult<()> {
    match request.request_type {
        QueueRequestType::JobQueueId => {
            request.job_queue_id = Some(resolver.job_queue_id().await?);
        }
        QueueRequestType::CommandSet => {
            request.command_set_name = Some(resolver.command_set_name().await?);
        }
        QueueRequestType::CommandTopic => {
            request.command_topic_name = Some(resolver.command_topic_name().await?);
        }
        QueueRequestType::HeartbeatTopic => {
            request.heartbeat_topic_name = Some(resolver.heartbeat_topic_name().await?);
        }
        QueueRequestType::BeanStatus => {
            let (Some(item_id), Some(queue_id)) = (request.item_id, request.queue_id.clone()) else {
                return Err(QueueError::Validation(
                    "BEAN_STATUS request needs an item id and a queue id".to_string(),
                ));
            };
            request.bean_status = Some(resolver.bean_status(item_id, &queue_id).await?);
        }
        QueueRequestType::Queue => {
            let Some(queue_id) = request.queue_id.clone() else {
                return Err(QueueError::Validation("QUEUE request needs a queue id".to_string()));
            };
            request.queue = Some(resolver.queue(&queue_id).await?);
        }
        QueueRequestType::ServiceStartStop => {
            if request.start_queue_service {
                resolver.start_service().await?;
            } else if request.stop_queue_service {
                resolver.stop_service(request.force_stop).await?;
            } else {
                return Err(QueueError::Validation(
                    "SERVICE_START_STOP request must ask to start or stop".to_string(),
                ));
            }
        }
    }
    Ok(())
}
