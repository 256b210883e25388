//! A queue bound to one consumer identity.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use actors::{ConsumerActor, ConsumerArgs, ConsumerMessage, ConsumerSettings, ProcessorFactory};
use fabric::EventFabric;
use queue_core::{
    ConsumerId, FabricMessage, HeartbeatBean, KillBean, QueueDescriptor, QueueError, QueueItem,
    QueueNames, QueueResult, QueueStatus,
};
use ractor::{Actor, ActorRef};
use tokio::task::JoinHandle;

use crate::config::ServiceConfig;
use crate::heartbeat::{DEFAULT_RECORDER_CAPACITY, HeartbeatMonitor};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared dependencies for constructing queues.
#[derive(Clone)]
pub struct QueueContext {
    pub fabric: Arc<dyn EventFabric>,
    pub settings: ConsumerSettings,
    pub stop_timeout: Duration,
    pub heartbeat_capacity: usize,
}

impl QueueContext {
    pub fn new(fabric: Arc<dyn EventFabric>) -> Self {
        Self {
            fabric,
            settings: ConsumerSettings::default(),
            stop_timeout: Duration::from_secs(5),
            heartbeat_capacity: DEFAULT_RECORDER_CAPACITY,
        }
    }

    pub fn from_config(fabric: Arc<dyn EventFabric>, config: &ServiceConfig) -> Self {
        Self {
            fabric,
            settings: config.consumer_settings(),
            stop_timeout: config.stop_timeout(),
            heartbeat_capacity: config.heartbeat_capacity,
        }
    }

    pub fn with_settings(mut self, settings: ConsumerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }
}

struct ConsumerHandle {
    actor: ActorRef<ConsumerMessage>,
    join: JoinHandle<()>,
}

/// One logical queue: its names, its consumer and the consumer's heartbeats.
///
/// Lifecycle: `INITIALISED -> STARTED <-> STOPPED`, ending in `KILLED` or
/// `DISPOSED`. The queue never buffers items itself; every list operation
/// goes straight to the fabric.
pub struct Queue {
    queue_id: String,
    uri: String,
    names: QueueNames,
    consumer_id: ConsumerId,
    context: QueueContext,
    processors: RwLock<Arc<ProcessorFactory>>,
    status: RwLock<QueueStatus>,
    monitor: HeartbeatMonitor,
    consumer: Mutex<Option<ConsumerHandle>>,
}

impl Queue {
    /// Create a queue whose names all derive from `queue_id`.
    ///
    /// Must be called inside a tokio runtime; the heartbeat monitor starts
    /// listening immediately.
    pub fn new(
        queue_id: impl Into<String>,
        uri: impl Into<String>,
        context: QueueContext,
        processors: Arc<ProcessorFactory>,
    ) -> QueueResult<Self> {
        let queue_id = queue_id.into();
        let names = QueueNames::derive(&queue_id);
        Self::with_names(queue_id, uri, names, context, processors)
    }

    /// Create a queue with explicit names, e.g. sharing a service command bus.
    pub fn with_names(
        queue_id: impl Into<String>,
        uri: impl Into<String>,
        names: QueueNames,
        context: QueueContext,
        processors: Arc<ProcessorFactory>,
    ) -> QueueResult<Self> {
        let queue_id = queue_id.into();
        let consumer_id = context.fabric.create_consumer(&queue_id)?;
        let monitor = HeartbeatMonitor::bound_to(
            Arc::clone(&context.fabric),
            names.heartbeat_topic.clone(),
            consumer_id,
            queue_id.clone(),
            context.heartbeat_capacity,
        )?;
        tracing::info!("Created queue {} with consumer {}", queue_id, consumer_id);

        Ok(Self {
            queue_id,
            uri: uri.into(),
            names,
            consumer_id,
            context,
            processors: RwLock::new(processors),
            status: RwLock::new(QueueStatus::Initialised),
            monitor,
            consumer: Mutex::new(None),
        })
    }

    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn names(&self) -> &QueueNames {
        &self.names
    }

    pub fn consumer_id(&self) -> ConsumerId {
        self.consumer_id
    }

    pub fn fabric(&self) -> &Arc<dyn EventFabric> {
        &self.context.fabric
    }

    pub fn heartbeat_monitor(&self) -> &HeartbeatMonitor {
        &self.monitor
    }

    /// Current status. A started queue whose consumer has exited, e.g.
    /// after a kill command, reports `KILLED`.
    pub fn status(&self) -> QueueStatus {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        if *status == QueueStatus::Started {
            let exited = lock(&self.consumer)
                .as_ref()
                .is_some_and(|handle| handle.join.is_finished());
            if exited {
                tracing::warn!("Consumer of queue {} has exited", self.queue_id);
                *status = QueueStatus::Killed;
            }
        }
        *status
    }

    fn set_status(&self, next: QueueStatus) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        tracing::info!("Queue {}: {} -> {}", self.queue_id, *status, next);
        *status = next;
    }

    pub fn descriptor(&self) -> QueueDescriptor {
        QueueDescriptor {
            queue_id: self.queue_id.clone(),
            uri: self.uri.clone(),
            names: self.names.clone(),
            consumer_id: self.consumer_id,
            status: self.status(),
        }
    }

    /// Processors used from the next start.
    pub fn set_processors(&self, processors: Arc<ProcessorFactory>) {
        *self.processors.write().unwrap_or_else(PoisonError::into_inner) = processors;
    }

    fn processors(&self) -> Arc<ProcessorFactory> {
        Arc::clone(&self.processors.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn take_consumer(&self) -> Option<ConsumerHandle> {
        lock(&self.consumer).take()
    }

    /// Wait for the consumer to exit, killing it after the stop timeout.
    async fn await_consumer(&self, handle: ConsumerHandle) {
        let ConsumerHandle { actor, join } = handle;
        if tokio::time::timeout(self.context.stop_timeout, join)
            .await
            .is_err()
        {
            tracing::warn!(
                "Consumer of queue {} did not stop within {:?}, killing it",
                self.queue_id,
                self.context.stop_timeout
            );
            actor.kill();
        }
    }

    /// Start consuming from the submission list.
    pub async fn start(&self) -> QueueResult<()> {
        let current = self.status();
        if current == QueueStatus::Started {
            tracing::warn!("Queue {} is already started", self.queue_id);
            return Ok(());
        }
        if !current.is_startable() {
            tracing::error!("Queue {} is {} and cannot be started", self.queue_id, current);
            return Err(QueueError::IllegalState(format!(
                "queue {} is {} and cannot be started",
                self.queue_id, current
            )));
        }

        let args = ConsumerArgs {
            consumer_id: self.consumer_id,
            queue_id: self.queue_id.clone(),
            names: self.names.clone(),
            fabric: Arc::clone(&self.context.fabric),
            processors: self.processors(),
            settings: self.context.settings,
        };
        let (actor, join) = Actor::spawn(None, ConsumerActor, args)
            .await
            .map_err(|err| {
                QueueError::Transport(format!(
                    "failed to start consumer for {}: {}",
                    self.queue_id, err
                ))
            })?;
        *lock(&self.consumer) = Some(ConsumerHandle { actor, join });
        self.set_status(QueueStatus::Started);
        Ok(())
    }

    /// Stop consuming. The running item is asked to terminate and the
    /// consumer exits once it settles.
    pub async fn stop(&self) -> QueueResult<()> {
        let current = self.status();
        if current != QueueStatus::Started {
            tracing::warn!("Queue {} is {}, nothing to stop", self.queue_id, current);
            return Ok(());
        }
        if let Some(handle) = self.take_consumer() {
            let _ = handle.actor.send_message(ConsumerMessage::Shutdown);
            self.await_consumer(handle).await;
        }
        self.set_status(QueueStatus::Stopped);
        Ok(())
    }

    /// Publish a kill command for this queue's consumer and wait for it to exit.
    ///
    /// If the command cannot be published the consumer actor is killed
    /// directly and the publish error is returned.
    pub async fn kill(&self, disconnect: bool, exit_process: bool) -> QueueResult<()> {
        let bean = KillBean::new(self.consumer_id, disconnect, exit_process);
        let published = self
            .context
            .fabric
            .publish(&self.names.command_topic, FabricMessage::Kill(bean));
        match &published {
            Ok(()) => tracing::info!(
                "Published kill for consumer {} of {}",
                self.consumer_id,
                self.queue_id
            ),
            Err(err) => tracing::error!(
                "Failed to publish kill for consumer {} of {}: {}",
                self.consumer_id,
                self.queue_id,
                err
            ),
        }

        if let Some(handle) = self.take_consumer() {
            if published.is_err() {
                handle.actor.kill();
            }
            self.await_consumer(handle).await;
        }
        if self.status() == QueueStatus::Started {
            self.set_status(QueueStatus::Killed);
        }
        published.map_err(QueueError::from)
    }

    /// Release the consumer identity and the queue's own lists and status
    /// topic. Fails while the queue is started.
    pub fn disconnect(&self) -> QueueResult<()> {
        let current = self.status();
        if current == QueueStatus::Started {
            tracing::error!("Cannot dispose queue {} while it is started", self.queue_id);
            return Err(QueueError::IllegalState(format!(
                "queue {} must be stopped before it is disposed",
                self.queue_id
            )));
        }
        self.monitor.stop();
        let fabric = &self.context.fabric;
        fabric.release_consumer(self.consumer_id);
        // Heartbeat and command topics may be shared with other queues.
        fabric.drop_list(&self.names.submission_queue);
        fabric.drop_list(&self.names.status_set);
        fabric.drop_topic(&self.names.status_topic);
        if !current.is_terminal() {
            self.set_status(QueueStatus::Disposed);
        }
        Ok(())
    }

    /// Empty the submission list and status set; `true` if both are now empty.
    pub fn clear_queues(&self) -> QueueResult<bool> {
        let fabric = &self.context.fabric;
        fabric.clear(&self.names.submission_queue)?;
        fabric.clear(&self.names.status_set)?;
        Ok(fabric.snapshot(&self.names.submission_queue)?.is_empty()
            && fabric.snapshot(&self.names.status_set)?.is_empty())
    }

    pub fn submission_list(&self) -> QueueResult<Vec<QueueItem>> {
        Ok(self.context.fabric.snapshot(&self.names.submission_queue)?)
    }

    pub fn status_set(&self) -> QueueResult<Vec<QueueItem>> {
        Ok(self.context.fabric.snapshot(&self.names.status_set)?)
    }

    pub fn has_submitted_jobs_pending(&self) -> QueueResult<bool> {
        Ok(!self.submission_list()?.is_empty())
    }

    pub fn get_latest_heartbeats(&self) -> Vec<HeartbeatBean> {
        self.monitor.get_latest_heartbeats()
    }

    pub fn get_last_heartbeat(&self) -> Option<HeartbeatBean> {
        self.monitor.get_last_heartbeat()
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("queue_id", &self.queue_id)
            .field("consumer_id", &self.consumer_id)
            .field("status", &*self.status.read().unwrap_or_else(PoisonError::into_inner))
            .finish_non_exhaustive()
    }
}
