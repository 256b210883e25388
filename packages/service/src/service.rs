//! Client handle for the queue service actor.

use std::sync::{Arc, Mutex, PoisonError};

use actors::ProcessorFactory;
use fabric::EventFabric;
use queue_core::{QueueError, QueueItem, QueueResult, QueueStatus};
use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef, RpcReplyPort};
use tokio::task::JoinHandle;

use crate::config::ServiceConfig;
use crate::messages::{ServiceMessage, ServiceSnapshot};
use crate::queue::Queue;
use crate::service_actor::{FabricSlot, ServiceActor, ServiceArgs};

/// Owner of the job queue and the registry of active queues.
///
/// Cheap to clone; every clone talks to the same actor, which serializes
/// lifecycle changes and active-queue registration.
#[derive(Clone)]
pub struct QueueService {
    actor: ActorRef<ServiceMessage>,
    fabric: FabricSlot,
    config: Arc<ServiceConfig>,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl QueueService {
    /// Spawn the service on `fabric`. Queue root and URI are taken from
    /// `config` and may be changed before `init`.
    pub async fn spawn(fabric: Arc<dyn EventFabric>, config: ServiceConfig) -> QueueResult<Self> {
        let config = Arc::new(config);
        let fabric = FabricSlot::new(fabric);
        let args = ServiceArgs {
            fabric: fabric.clone(),
            config: Arc::clone(&config),
        };
        let (actor, join) = Actor::spawn(None, ServiceActor, args)
            .await
            .map_err(|err| QueueError::Transport(format!("failed to spawn queue service: {}", err)))?;
        Ok(Self {
            actor,
            fabric,
            config,
            join: Arc::new(Mutex::new(Some(join))),
        })
    }

    async fn call<T, F>(&self, build: F) -> QueueResult<T>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<QueueResult<T>>) -> ServiceMessage,
    {
        match ractor::rpc::call(&self.actor, build, None).await {
            Ok(CallResult::Success(result)) => result,
            Ok(CallResult::Timeout) => Err(QueueError::Timeout(
                "queue service did not reply in time".to_string(),
            )),
            Ok(CallResult::SenderError) => Err(QueueError::Transport(
                "queue service dropped the request".to_string(),
            )),
            Err(err) => Err(QueueError::Transport(format!(
                "queue service is not running: {}",
                err
            ))),
        }
    }

    /// The fabric the service currently runs on. Follows `set_uri`.
    pub fn fabric(&self) -> Arc<dyn EventFabric> {
        self.fabric.current()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub async fn init(&self) -> QueueResult<()> {
        self.call(|reply| ServiceMessage::Init { reply }).await
    }

    pub async fn start(&self) -> QueueResult<()> {
        self.call(|reply| ServiceMessage::Start { reply }).await
    }

    /// Stop all active queues, then the job queue. With `force` each
    /// started queue's consumer is sent a kill command instead.
    pub async fn stop(&self, force: bool) -> QueueResult<()> {
        self.call(|reply| ServiceMessage::Stop { force, reply }).await
    }

    pub async fn dispose_service(&self) -> QueueResult<()> {
        self.call(|reply| ServiceMessage::Dispose { reply }).await
    }

    /// Create a new active queue in `INITIALISED` and return its id.
    pub async fn register_new_active_queue(&self) -> QueueResult<String> {
        self.call(|reply| ServiceMessage::RegisterActiveQueue { reply })
            .await
    }

    pub async fn deregister_active_queue(&self, queue_id: &str, force: bool) -> QueueResult<()> {
        let queue_id = queue_id.to_string();
        self.call(|reply| ServiceMessage::DeregisterActiveQueue {
            queue_id,
            force,
            reply,
        })
        .await
    }

    pub async fn start_active_queue(&self, queue_id: &str) -> QueueResult<()> {
        let queue_id = queue_id.to_string();
        self.call(|reply| ServiceMessage::StartActiveQueue { queue_id, reply })
            .await
    }

    pub async fn stop_active_queue(&self, queue_id: &str, force: bool) -> QueueResult<()> {
        let queue_id = queue_id.to_string();
        self.call(|reply| ServiceMessage::StopActiveQueue {
            queue_id,
            force,
            reply,
        })
        .await
    }

    pub async fn get_queue(&self, queue_id: &str) -> QueueResult<Arc<Queue>> {
        let queue_id = queue_id.to_string();
        self.call(|reply| ServiceMessage::GetQueue { queue_id, reply })
            .await
    }

    pub async fn get_job_queue(&self) -> QueueResult<Arc<Queue>> {
        self.call(|reply| ServiceMessage::GetJobQueue { reply }).await
    }

    pub async fn get_active_queue(&self, queue_id: &str) -> QueueResult<Arc<Queue>> {
        let queue_id = queue_id.to_string();
        self.call(|reply| ServiceMessage::GetActiveQueue { queue_id, reply })
            .await
    }

    pub async fn kill_queue(
        &self,
        queue_id: &str,
        disconnect: bool,
        exit_process: bool,
    ) -> QueueResult<()> {
        let queue_id = queue_id.to_string();
        self.call(|reply| ServiceMessage::KillQueue {
            queue_id,
            disconnect,
            exit_process,
            reply,
        })
        .await
    }

    pub async fn set_queue_root(&self, queue_root: impl Into<String>) -> QueueResult<()> {
        let queue_root = queue_root.into();
        self.call(|reply| ServiceMessage::SetQueueRoot { queue_root, reply })
            .await
    }

    pub async fn set_uri(&self, uri: impl Into<String>) -> QueueResult<()> {
        let uri = uri.into();
        self.call(|reply| ServiceMessage::SetUri { uri, reply }).await
    }

    pub async fn set_job_queue_processor(&self, processors: ProcessorFactory) -> QueueResult<()> {
        let processors = Arc::new(processors);
        self.call(|reply| ServiceMessage::SetJobQueueProcessor { processors, reply })
            .await
    }

    pub async fn set_active_queue_processor(&self, processors: ProcessorFactory) -> QueueResult<()> {
        let processors = Arc::new(processors);
        self.call(|reply| ServiceMessage::SetActiveQueueProcessor { processors, reply })
            .await
    }

    pub async fn snapshot(&self) -> QueueResult<ServiceSnapshot> {
        self.call(|reply| ServiceMessage::GetSnapshot { reply }).await
    }

    pub async fn is_initialized(&self) -> QueueResult<bool> {
        Ok(self.snapshot().await?.initialized)
    }

    pub async fn is_active(&self) -> QueueResult<bool> {
        Ok(self.snapshot().await?.active)
    }

    pub async fn queue_root(&self) -> QueueResult<Option<String>> {
        Ok(self.snapshot().await?.queue_root)
    }

    pub async fn uri(&self) -> QueueResult<Option<String>> {
        Ok(self.snapshot().await?.uri)
    }

    pub async fn get_job_queue_id(&self) -> QueueResult<String> {
        required(self.snapshot().await?.job_queue_id, "job queue id")
    }

    pub async fn get_heartbeat_topic_name(&self) -> QueueResult<String> {
        required(self.snapshot().await?.heartbeat_topic, "heartbeat topic")
    }

    pub async fn get_command_set_name(&self) -> QueueResult<String> {
        required(self.snapshot().await?.command_set, "command set")
    }

    pub async fn get_command_topic_name(&self) -> QueueResult<String> {
        required(self.snapshot().await?.command_topic, "command topic")
    }

    pub async fn get_all_active_queue_ids(&self) -> QueueResult<Vec<String>> {
        Ok(self.snapshot().await?.active_queue_ids)
    }

    pub async fn is_active_queue_registered(&self, queue_id: &str) -> QueueResult<bool> {
        Ok(self
            .snapshot()
            .await?
            .active_queue_ids
            .iter()
            .any(|id| id == queue_id))
    }

    pub async fn get_queue_status(&self, queue_id: &str) -> QueueResult<QueueStatus> {
        Ok(self.get_queue(queue_id).await?.status())
    }

    /// Items that have been dequeued by the queue's consumer, with their
    /// latest status.
    pub async fn get_status_set(&self, queue_id: &str) -> QueueResult<Vec<QueueItem>> {
        self.get_queue(queue_id).await?.status_set()
    }

    pub async fn get_active_queue_status_set(&self, queue_id: &str) -> QueueResult<Vec<QueueItem>> {
        self.get_active_queue(queue_id).await?.status_set()
    }

    /// Stop the service actor, stopping any started queues gracefully.
    pub async fn shutdown(&self) {
        self.actor.stop(None);
        let join = self.join.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(join) = join {
            if let Err(err) = join.await {
                tracing::warn!("Queue service ended abnormally: {}", err);
            }
        }
    }
}

fn required(value: Option<String>, what: &str) -> QueueResult<String> {
    value.ok_or_else(|| {
        QueueError::IllegalState(format!(
            "the {} is not known until the queue service is initialised",
            what
        ))
    })
}

impl std::fmt::Debug for QueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueService")
            .field("uri", &self.fabric().uri())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
