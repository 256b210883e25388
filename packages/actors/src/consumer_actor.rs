//! Consumer actor that executes one queue's items and reports liveness.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fabric::EventFabric;
use queue_core::{
    ConsumerId, ConsumerState, FabricMessage, HeartbeatBean, QueueItem, QueueNames, Status,
};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::messages::ConsumerMessage;
use crate::process::{DEFAULT_TERMINATE_GRACE, QueueProcess};
use crate::processor::ProcessorFactory;
use crate::publisher::StatusPublisher;

/// Consumer timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    pub terminate_grace: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(50),
            terminate_grace: DEFAULT_TERMINATE_GRACE,
        }
    }
}

impl ConsumerSettings {
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }
}

/// Consumer actor arguments.
pub struct ConsumerArgs {
    pub consumer_id: ConsumerId,
    pub queue_id: String,
    pub names: QueueNames,
    pub fabric: Arc<dyn EventFabric>,
    pub processors: Arc<ProcessorFactory>,
    pub settings: ConsumerSettings,
}

/// State for the consumer actor.
pub struct ConsumerActorState {
    consumer_id: ConsumerId,
    queue_id: String,
    names: QueueNames,
    fabric: Arc<dyn EventFabric>,
    processors: Arc<ProcessorFactory>,
    publisher: StatusPublisher,
    settings: ConsumerSettings,
    /// Item being executed; at most one at a time.
    current: Option<Arc<QueueProcess>>,
    paused: bool,
    stopping: bool,
    beat: u64,
    conception_time: DateTime<Utc>,
    /// Ticker and subscription tasks, aborted on stop.
    tasks: Vec<JoinHandle<()>>,
}

impl ConsumerActorState {
    fn new(args: ConsumerArgs) -> Self {
        let publisher = StatusPublisher::for_queue(Arc::clone(&args.fabric), &args.names);
        Self {
            consumer_id: args.consumer_id,
            queue_id: args.queue_id,
            names: args.names,
            fabric: args.fabric,
            processors: args.processors,
            publisher,
            settings: args.settings,
            current: None,
            paused: false,
            stopping: false,
            beat: 0,
            conception_time: Utc::now(),
            tasks: Vec::new(),
        }
    }

    /// Check if the consumer is idle.
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    fn consumer_state(&self) -> ConsumerState {
        if self.paused {
            ConsumerState::Paused
        } else {
            ConsumerState::Running
        }
    }

    fn start_item(&mut self, myself: &ActorRef<ConsumerMessage>, mut item: QueueItem) {
        let item_id = item.id;

        if !self.processors.has_processor(item.item_type) {
            tracing::error!(
                "Queue {} has no processor for {}, failing item {}",
                self.queue_id,
                item.item_type,
                item_id
            );
            item.set_status(Status::Failed);
            item.set_message(format!("No processor registered for {}", item.item_type));
            if let Err(err) = self.publisher.broadcast(&item) {
                tracing::warn!("Failed to publish status of item {}: {}", item_id, err);
            }
            return;
        }

        let process = match self
            .processors
            .get_processor(item, self.publisher.clone(), true)
        {
            Ok(process) => Arc::new(process.with_terminate_grace(self.settings.terminate_grace)),
            Err(err) => {
                tracing::error!("Failed to bind processor for item {}: {}", item_id, err);
                return;
            }
        };

        self.current = Some(Arc::clone(&process));
        let myself = myself.clone();
        tokio::spawn(async move {
            let result = process.execute().await;
            let _ = myself.send_message(ConsumerMessage::ProcessFinished { item_id, result });
        });
    }

    fn terminate_current(&self) {
        if let Some(process) = &self.current {
            if !process.is_finished() {
                if let Err(err) = process.terminate() {
                    tracing::debug!("Terminate of item {}: {}", process.item_id(), err);
                }
            }
        }
    }

    fn publish_heartbeat(&mut self) {
        self.beat += 1;
        let beat = HeartbeatBean {
            consumer_id: self.consumer_id,
            consumer_name: self.queue_id.clone(),
            publish_time: Utc::now(),
            conception_time: self.conception_time,
            beat: self.beat,
            consumer_state: self.consumer_state(),
            current_item: self.current.as_ref().map(|process| process.item_id()),
        };
        tracing::debug!("Heartbeat #{} from consumer {}", beat.beat, beat.consumer_id);
        if let Err(err) = self
            .fabric
            .publish(&self.names.heartbeat_topic, FabricMessage::Heartbeat(beat))
        {
            tracing::warn!("Failed to publish heartbeat for {}: {}", self.queue_id, err);
        }
    }
}

/// Spawn a task that sends `message` to the actor on every tick.
fn spawn_ticker(
    myself: ActorRef<ConsumerMessage>,
    period: Duration,
    message: fn() -> ConsumerMessage,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if myself.send_message(message()).is_err() {
                break;
            }
        }
    })
}

/// Spawn a task forwarding topic messages the filter accepts to the actor.
fn spawn_listener<F>(
    myself: ActorRef<ConsumerMessage>,
    mut receiver: broadcast::Receiver<FabricMessage>,
    topic: String,
    filter: F,
) -> JoinHandle<()>
where
    F: Fn(FabricMessage) -> Option<ConsumerMessage> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(message) => {
                    if let Some(forward) = filter(message) {
                        if myself.send_message(forward).is_err() {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Listener on {} skipped {} messages", topic, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Consumer actor that dequeues and executes items from one submission list.
pub struct ConsumerActor;

impl Actor for ConsumerActor {
    type Msg = ConsumerMessage;
    type State = ConsumerActorState;
    type Arguments = ConsumerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting consumer {} for {}", args.consumer_id, args.queue_id);

        let mut state = ConsumerActorState::new(args);
        let consumer_id = state.consumer_id;

        // Subscribe before returning so no command published after start is missed.
        let commands = state.fabric.subscribe(&state.names.command_topic)?;
        state.tasks.push(spawn_listener(
            myself.clone(),
            commands,
            state.names.command_topic.clone(),
            move |message| match message {
                FabricMessage::Pause(bean) if bean.consumer_id == consumer_id => {
                    Some(ConsumerMessage::Pause { pause: bean.pause })
                }
                FabricMessage::Kill(bean) if bean.consumer_id == consumer_id => {
                    Some(ConsumerMessage::Kill {
                        disconnect: bean.disconnect,
                        exit_process: bean.exit_process,
                    })
                }
                _ => None,
            },
        ));

        let statuses = state.fabric.subscribe(&state.names.status_topic)?;
        state.tasks.push(spawn_listener(
            myself.clone(),
            statuses,
            state.names.status_topic.clone(),
            |message| match message {
                FabricMessage::Item(item) if item.status.is_request() => {
                    Some(ConsumerMessage::ItemRequest {
                        item: Box::new(item),
                    })
                }
                _ => None,
            },
        ));

        state.tasks.push(spawn_ticker(
            myself.clone(),
            state.settings.heartbeat_interval,
            || ConsumerMessage::Heartbeat,
        ));
        state.tasks.push(spawn_ticker(
            myself,
            state.settings.poll_interval,
            || ConsumerMessage::Poll,
        ));

        Ok(state)
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for task in state.tasks.drain(..) {
            task.abort();
        }
        state.terminate_current();
        tracing::info!(
            "Consumer {} for {} stopped after {} heartbeats",
            state.consumer_id,
            state.queue_id,
            state.beat
        );
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ConsumerMessage::Poll => {
                if state.stopping || state.paused || !state.is_idle() {
                    return Ok(());
                }
                match state.fabric.pop_front(&state.names.submission_queue) {
                    Ok(Some(item)) => state.start_item(&myself, item),
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!("Failed to poll {}: {}", state.names.submission_queue, err);
                    }
                }
            }

            ConsumerMessage::Heartbeat => {
                if !state.stopping {
                    state.publish_heartbeat();
                }
            }

            ConsumerMessage::Pause { pause } => {
                if state.paused == pause {
                    tracing::warn!(
                        "Consumer {} is already {}",
                        state.consumer_id,
                        if pause { "paused" } else { "running" }
                    );
                } else {
                    tracing::info!(
                        "{} consumer {}",
                        if pause { "Pausing" } else { "Resuming" },
                        state.consumer_id
                    );
                    state.paused = pause;
                }
            }

            ConsumerMessage::Kill {
                disconnect,
                exit_process,
            } => {
                tracing::info!("Consumer {} for {} killed", state.consumer_id, state.queue_id);
                if exit_process {
                    tracing::warn!(
                        "Consumer {} runs in-process, ignoring exit-process request",
                        state.consumer_id
                    );
                }
                state.stopping = true;
                state.terminate_current();
                if disconnect {
                    state.fabric.release_consumer(state.consumer_id);
                }
                myself.stop(Some("killed".to_string()));
            }

            ConsumerMessage::ItemRequest { item } => {
                let Some(process) = state
                    .current
                    .as_ref()
                    .filter(|process| process.item_id() == item.id)
                else {
                    tracing::debug!(
                        "Ignoring {} for item {} not running on {}",
                        item.status,
                        item.id,
                        state.queue_id
                    );
                    return Ok(());
                };
                if process.item().status == item.status {
                    // Republished with a progress update; already applied.
                    return Ok(());
                }
                let result = match item.status {
                    Status::RequestPause => process.pause(),
                    Status::RequestResume => process.resume(),
                    Status::RequestTerminate => process.terminate(),
                    _ => Ok(()),
                };
                if let Err(err) = result {
                    tracing::warn!("Could not apply {} to item {}: {}", item.status, item.id, err);
                }
            }

            ConsumerMessage::ProcessFinished { item_id, result } => {
                if state
                    .current
                    .as_ref()
                    .is_some_and(|process| process.item_id() == item_id)
                {
                    state.current = None;
                }
                match result {
                    Ok(item) => tracing::debug!("Item {} settled as {}", item_id, item.status),
                    Err(err) => tracing::warn!("Item {} ended with error: {}", item_id, err),
                }
                if state.stopping {
                    myself.stop(None);
                } else {
                    myself.send_message(ConsumerMessage::Poll)?;
                }
            }

            ConsumerMessage::IsIdle { reply } => {
                let _ = reply.send(state.is_idle());
            }

            ConsumerMessage::GetState { reply } => {
                let _ = reply.send(state.consumer_state());
            }

            ConsumerMessage::Shutdown => {
                tracing::info!("Shutting down consumer {} for {}", state.consumer_id, state.queue_id);
                state.stopping = true;
                if state.is_idle() {
                    myself.stop(None);
                } else {
                    // Stop once the running item settles.
                    state.terminate_current();
                }
            }
        }

        Ok(())
    }
}
