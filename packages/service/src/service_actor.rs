//! Service actor owning the job queue and the active-queue registry.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use actors::ProcessorFactory;
use fabric::{EventFabric, FabricConfig};
use queue_core::{QueueError, QueueResult, QueueStatus, ServiceNames, active_queue_id};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::config::ServiceConfig;
use crate::messages::{ServiceMessage, ServiceSnapshot};
use crate::queue::{Queue, QueueContext};

/// The fabric a service currently runs on, shared with its handles.
///
/// Replaced when the service URI changes.
#[derive(Clone)]
pub struct FabricSlot(Arc<RwLock<Arc<dyn EventFabric>>>);

impl FabricSlot {
    pub fn new(fabric: Arc<dyn EventFabric>) -> Self {
        Self(Arc::new(RwLock::new(fabric)))
    }

    pub fn current(&self) -> Arc<dyn EventFabric> {
        Arc::clone(&self.0.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn replace(&self, fabric: Arc<dyn EventFabric>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = fabric;
    }
}

/// Service actor arguments.
pub struct ServiceArgs {
    pub fabric: FabricSlot,
    pub config: Arc<ServiceConfig>,
}

/// State for the service actor.
pub struct ServiceState {
    config: Arc<ServiceConfig>,
    fabric: FabricSlot,
    queue_root: Option<String>,
    uri: Option<String>,
    names: Option<ServiceNames>,
    job_queue: Option<Arc<Queue>>,
    active_queues: BTreeMap<String, Arc<Queue>>,
    job_processors: Arc<ProcessorFactory>,
    active_processors: Arc<ProcessorFactory>,
    initialized: bool,
    active: bool,
    disposed: bool,
    /// Last active-queue number handed out; never reused.
    active_queue_counter: u64,
}

impl ServiceState {
    pub fn new(args: ServiceArgs) -> Self {
        Self {
            queue_root: args.config.queue_root.clone(),
            uri: args.config.uri.clone(),
            config: args.config,
            fabric: args.fabric,
            names: None,
            job_queue: None,
            active_queues: BTreeMap::new(),
            job_processors: Arc::new(ProcessorFactory::new()),
            active_processors: Arc::new(ProcessorFactory::new()),
            initialized: false,
            active: false,
            disposed: false,
            active_queue_counter: 0,
        }
    }

    fn context(&self) -> QueueContext {
        QueueContext::from_config(self.fabric.current(), &self.config)
    }

    fn names(&self) -> QueueResult<&ServiceNames> {
        self.names.as_ref().ok_or_else(|| {
            QueueError::IllegalState("queue service has not been initialised".to_string())
        })
    }

    fn job_queue(&self) -> QueueResult<Arc<Queue>> {
        self.job_queue.clone().ok_or_else(|| {
            QueueError::IllegalState("queue service has not been initialised".to_string())
        })
    }

    fn active_queue(&self, queue_id: &str) -> QueueResult<Arc<Queue>> {
        self.active_queues
            .get(queue_id)
            .cloned()
            .ok_or_else(|| QueueError::NotFound(format!("no active queue with id {}", queue_id)))
    }

    fn get_queue(&self, queue_id: &str) -> QueueResult<Arc<Queue>> {
        if let Some(job_queue) = self.job_queue.as_ref().filter(|q| q.queue_id() == queue_id) {
            return Ok(Arc::clone(job_queue));
        }
        self.active_queues.get(queue_id).cloned().ok_or_else(|| {
            tracing::error!("No queue with id {}", queue_id);
            QueueError::NotFound(format!("no queue with id {}", queue_id))
        })
    }

    pub fn init(&mut self) -> QueueResult<()> {
        if self.initialized {
            tracing::warn!("Queue service is already initialised");
            return Ok(());
        }
        let (Some(root), Some(uri)) = (self.queue_root.as_deref(), self.uri.as_deref()) else {
            tracing::error!("Cannot initialise queue service without a queue root and URI");
            return Err(QueueError::IllegalState(
                "queue root and URI must be set before the service is initialised".to_string(),
            ));
        };

        let names = ServiceNames::derive(root);
        let job_queue = Queue::with_names(
            names.job_queue_id.clone(),
            uri,
            names.queue_names(&names.job_queue_id),
            self.context(),
            Arc::clone(&self.job_processors),
        )?;
        tracing::info!("Queue service initialised with job queue {}", names.job_queue_id);

        self.job_queue = Some(Arc::new(job_queue));
        self.names = Some(names);
        self.initialized = true;
        self.disposed = false;
        Ok(())
    }

    pub async fn start(&mut self) -> QueueResult<()> {
        if !self.initialized {
            let reason = if self.disposed {
                "queue service has been disposed and must be re-initialised before it is started"
            } else {
                "queue service must be initialised before it is started"
            };
            tracing::error!("Cannot start: {}", reason);
            return Err(QueueError::IllegalState(reason.to_string()));
        }
        if self.active {
            tracing::warn!("Queue service is already started");
            return Ok(());
        }
        self.job_queue()?.start().await?;
        self.active = true;
        tracing::info!("Queue service started");
        Ok(())
    }

    pub async fn stop(&mut self, force: bool) -> QueueResult<()> {
        if !self.active {
            tracing::warn!("Queue service is not started, nothing to stop");
            return Ok(());
        }
        tracing::info!("Stopping queue service (force: {})", force);

        // Every queue is stopped even if an earlier one fails; the first error is returned.
        let mut first_error = None;
        let queue_ids: Vec<String> = self.active_queues.keys().cloned().collect();
        for queue_id in queue_ids {
            if let Err(err) = self.stop_registered_queue(&queue_id, force).await {
                tracing::error!("Failed to stop active queue {}: {}", queue_id, err);
                first_error.get_or_insert(err);
            }
        }

        let stopped = match self.job_queue() {
            Ok(job_queue) if force => job_queue.kill(true, false).await,
            Ok(job_queue) => job_queue.stop().await,
            Err(err) => Err(err),
        };
        if let Err(err) = stopped {
            tracing::error!("Failed to stop the job queue: {}", err);
            first_error.get_or_insert(err);
        }

        self.active = false;
        match first_error {
            Some(err) => Err(err),
            None => {
                tracing::info!("Queue service stopped");
                Ok(())
            }
        }
    }

    async fn stop_registered_queue(&mut self, queue_id: &str, force: bool) -> QueueResult<()> {
        let queue = self.active_queue(queue_id)?;
        let killed = if force && queue.status() == QueueStatus::Started {
            queue.kill(true, false).await
        } else {
            Ok(())
        };
        let deregistered = self.deregister_active_queue(queue_id, true).await;
        killed.and(deregistered)
    }

    pub async fn dispose(&mut self) -> QueueResult<()> {
        if self.active {
            self.stop(false).await?;
        }
        if let Some(job_queue) = self.job_queue.take() {
            job_queue.clear_queues()?;
            job_queue.disconnect()?;
        }
        self.names = None;
        self.initialized = false;
        self.disposed = true;
        tracing::info!("Queue service disposed");
        Ok(())
    }

    pub fn register_active_queue(&mut self) -> QueueResult<String> {
        if !self.active {
            tracing::error!("Cannot register an active queue before the service is started");
            return Err(QueueError::IllegalState(
                "queue service must be started before registering an active queue".to_string(),
            ));
        }
        let (Some(root), Some(uri)) = (self.queue_root.as_deref(), self.uri.as_deref()) else {
            return Err(QueueError::IllegalState(
                "queue root and URI are not set".to_string(),
            ));
        };
        let names = self.names()?;

        let queue_id = active_queue_id(root, self.active_queue_counter + 1);
        let queue = Queue::with_names(
            queue_id.clone(),
            uri,
            names.queue_names(&queue_id),
            self.context(),
            Arc::clone(&self.active_processors),
        )?;
        if !queue.clear_queues()? {
            tracing::warn!("Lists of active queue {} were not empty after clearing", queue_id);
        }

        self.active_queue_counter += 1;
        self.active_queues.insert(queue_id.clone(), Arc::new(queue));
        tracing::info!("Registered active queue {}", queue_id);
        Ok(queue_id)
    }

    pub async fn deregister_active_queue(&mut self, queue_id: &str, force: bool) -> QueueResult<()> {
        let queue = self.active_queue(queue_id)?;
        if queue.status() == QueueStatus::Started {
            if !force {
                tracing::error!("Cannot deregister started active queue {}", queue_id);
                return Err(QueueError::IllegalState(format!(
                    "active queue {} is started; stop it or deregister with force",
                    queue_id
                )));
            }
            queue.stop().await?;
        }
        queue.clear_queues()?;
        queue.disconnect()?;
        self.active_queues.remove(queue_id);
        tracing::info!("Deregistered active queue {}", queue_id);
        Ok(())
    }

    pub async fn start_active_queue(&self, queue_id: &str) -> QueueResult<()> {
        self.active_queue(queue_id)?.start().await
    }

    pub async fn stop_active_queue(&self, queue_id: &str, force: bool) -> QueueResult<()> {
        let queue = self.active_queue(queue_id)?;
        if force {
            queue.kill(false, false).await
        } else {
            queue.stop().await
        }
    }

    pub async fn kill_queue(
        &self,
        queue_id: &str,
        disconnect: bool,
        exit_process: bool,
    ) -> QueueResult<()> {
        self.get_queue(queue_id)?.kill(disconnect, exit_process).await
    }

    fn ensure_reconfigurable(&self, what: &str) -> QueueResult<()> {
        if self.active {
            tracing::error!("Cannot change the {} of a started queue service", what);
            return Err(QueueError::Unsupported(format!(
                "the {} cannot be changed while the queue service is started",
                what
            )));
        }
        Ok(())
    }

    /// Recreate the job queue under the current root and URI.
    fn rebuild(&mut self) -> QueueResult<()> {
        if !self.initialized {
            return Ok(());
        }
        if let Some(job_queue) = self.job_queue.take() {
            job_queue.disconnect()?;
        }
        self.names = None;
        self.initialized = false;
        self.init()
    }

    pub fn set_queue_root(&mut self, queue_root: String) -> QueueResult<()> {
        self.ensure_reconfigurable("queue root")?;
        tracing::info!("Queue root set to {}", queue_root);
        self.queue_root = Some(queue_root);
        self.rebuild()
    }

    /// Change the transport address, reconnecting when it names a
    /// different fabric. Queues built afterwards run on the new fabric.
    pub fn set_uri(&mut self, uri: String) -> QueueResult<()> {
        self.ensure_reconfigurable("URI")?;
        if self.fabric.current().uri() != uri {
            let reconnected = fabric::connect(FabricConfig::default().with_uri(uri.as_str()))?;
            tracing::info!("Reconnected queue service to {}", uri);
            self.fabric.replace(reconnected);
        }
        tracing::info!("Queue URI set to {}", uri);
        self.uri = Some(uri);
        self.rebuild()
    }

    fn ensure_stopped(&self, what: &str) -> QueueResult<()> {
        if self.active {
            tracing::error!("Cannot set the {} while the queue service is started", what);
            return Err(QueueError::IllegalState(format!(
                "the {} cannot be set while the queue service is started",
                what
            )));
        }
        Ok(())
    }

    pub fn set_job_queue_processor(&mut self, processors: Arc<ProcessorFactory>) -> QueueResult<()> {
        self.ensure_stopped("job queue processor")?;
        if let Some(job_queue) = &self.job_queue {
            job_queue.set_processors(Arc::clone(&processors));
        }
        self.job_processors = processors;
        Ok(())
    }

    pub fn set_active_queue_processor(
        &mut self,
        processors: Arc<ProcessorFactory>,
    ) -> QueueResult<()> {
        self.ensure_stopped("active queue processor")?;
        for queue in self.active_queues.values() {
            queue.set_processors(Arc::clone(&processors));
        }
        self.active_processors = processors;
        Ok(())
    }

    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            queue_root: self.queue_root.clone(),
            uri: self.uri.clone(),
            heartbeat_topic: self.names.as_ref().map(|n| n.heartbeat_topic.clone()),
            command_set: self.names.as_ref().map(|n| n.command_set.clone()),
            command_topic: self.names.as_ref().map(|n| n.command_topic.clone()),
            job_queue_id: self.names.as_ref().map(|n| n.job_queue_id.clone()),
            initialized: self.initialized,
            active: self.active,
            active_queue_ids: self.active_queues.keys().cloned().collect(),
        }
    }
}

/// Service actor that serializes every lifecycle and registry change.
pub struct ServiceActor;

impl Actor for ServiceActor {
    type Msg = ServiceMessage;
    type State = ServiceState;
    type Arguments = ServiceArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting queue service on {}", args.fabric.current().uri());
        Ok(ServiceState::new(args))
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if state.active {
            if let Err(err) = state.stop(false).await {
                tracing::warn!("Failed to stop queues on shutdown: {}", err);
            }
        }
        tracing::info!("Queue service stopped");
        Ok(())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ServiceMessage::Init { reply } => {
                let _ = reply.send(state.init());
            }

            ServiceMessage::Start { reply } => {
                let _ = reply.send(state.start().await);
            }

            ServiceMessage::Stop { force, reply } => {
                let _ = reply.send(state.stop(force).await);
            }

            ServiceMessage::Dispose { reply } => {
                let _ = reply.send(state.dispose().await);
            }

            ServiceMessage::RegisterActiveQueue { reply } => {
                let _ = reply.send(state.register_active_queue());
            }

            ServiceMessage::DeregisterActiveQueue {
                queue_id,
                force,
                reply,
            } => {
                let _ = reply.send(state.deregister_active_queue(&queue_id, force).await);
            }

            ServiceMessage::StartActiveQueue { queue_id, reply } => {
                let _ = reply.send(state.start_active_queue(&queue_id).await);
            }

            ServiceMessage::StopActiveQueue {
                queue_id,
                force,
                reply,
            } => {
                let _ = reply.send(state.stop_active_queue(&queue_id, force).await);
            }

            ServiceMessage::GetQueue { queue_id, reply } => {
                let _ = reply.send(state.get_queue(&queue_id));
            }

            ServiceMessage::GetJobQueue { reply } => {
                let _ = reply.send(state.job_queue());
            }

            ServiceMessage::GetActiveQueue { queue_id, reply } => {
                let _ = reply.send(state.active_queue(&queue_id));
            }

            ServiceMessage::KillQueue {
                queue_id,
                disconnect,
                exit_process,
                reply,
            } => {
                let _ = reply.send(state.kill_queue(&queue_id, disconnect, exit_process).await);
            }

            ServiceMessage::SetQueueRoot { queue_root, reply } => {
                let _ = reply.send(state.set_queue_root(queue_root));
            }

            ServiceMessage::SetUri { uri, reply } => {
                let _ = reply.send(state.set_uri(uri));
            }

            ServiceMessage::SetJobQueueProcessor { processors, reply } => {
                let _ = reply.send(state.set_job_queue_processor(processors));
            }

            ServiceMessage::SetActiveQueueProcessor { processors, reply } => {
                let _ = reply.send(state.set_active_queue_processor(processors));
            }

            ServiceMessage::GetSnapshot { reply } => {
                let _ = reply.send(Ok(state.snapshot()));
            }
        }

        Ok(())
    }
}
