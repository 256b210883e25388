//! Heartbeat recording for one consumer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use fabric::EventFabric;
use queue_core::{ConsumerId, FabricMessage, HeartbeatBean, QueueError, QueueResult};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::queue::Queue;
use crate::service::QueueService;

pub const DEFAULT_RECORDER_CAPACITY: usize = 100;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Size-limited, insertion-ordered record of heartbeats.
#[derive(Debug, Clone)]
pub struct HeartbeatRecorder {
    capacity: usize,
    beats: VecDeque<HeartbeatBean>,
}

impl HeartbeatRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            beats: VecDeque::new(),
        }
    }

    /// Append a beat, evicting the oldest once full.
    pub fn record(&mut self, beat: HeartbeatBean) {
        while self.beats.len() >= self.capacity {
            self.beats.pop_front();
        }
        self.beats.push_back(beat);
    }

    pub fn recording(&self) -> Vec<HeartbeatBean> {
        self.beats.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<HeartbeatBean> {
        self.beats.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.beats.len() > self.capacity {
            self.beats.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.beats.clear();
    }
}

impl Default for HeartbeatRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_RECORDER_CAPACITY)
    }
}

#[derive(Debug, Clone)]
struct Target {
    heartbeat_topic: String,
    consumer_id: ConsumerId,
    queue_id: Option<String>,
}

/// Tracks liveness of one consumer by recording the heartbeats it publishes.
///
/// The monitor does not judge liveness itself; callers compare
/// [`last_heartbeat_age`](Self::last_heartbeat_age) with the broadcast interval.
pub struct HeartbeatMonitor {
    fabric: Arc<dyn EventFabric>,
    target: Arc<RwLock<Target>>,
    recorder: Arc<Mutex<HeartbeatRecorder>>,
    locked: bool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    /// Monitor `consumer_id` on `heartbeat_topic`.
    ///
    /// A `locked` monitor refuses to be re-pointed after creation.
    pub fn new(
        fabric: Arc<dyn EventFabric>,
        heartbeat_topic: impl Into<String>,
        consumer_id: ConsumerId,
        locked: bool,
    ) -> QueueResult<Self> {
        Self::with_target(
            fabric,
            Target {
                heartbeat_topic: heartbeat_topic.into(),
                consumer_id,
                queue_id: None,
            },
            locked,
            DEFAULT_RECORDER_CAPACITY,
        )
    }

    /// Monitor the consumer bound to `queue`.
    pub fn for_queue(queue: &Queue, locked: bool) -> QueueResult<Self> {
        Self::with_target(
            Arc::clone(queue.fabric()),
            Target {
                heartbeat_topic: queue.names().heartbeat_topic.clone(),
                consumer_id: queue.consumer_id(),
                queue_id: Some(queue.queue_id().to_string()),
            },
            locked,
            DEFAULT_RECORDER_CAPACITY,
        )
    }

    /// Monitor the consumer of the queue `queue_id` registered with `service`.
    pub async fn for_queue_id(
        fabric: Arc<dyn EventFabric>,
        heartbeat_topic: impl Into<String>,
        queue_id: &str,
        service: &QueueService,
        locked: bool,
    ) -> QueueResult<Self> {
        let queue = service.get_queue(queue_id).await?;
        Self::with_target(
            fabric,
            Target {
                heartbeat_topic: heartbeat_topic.into(),
                consumer_id: queue.consumer_id(),
                queue_id: Some(queue_id.to_string()),
            },
            locked,
            DEFAULT_RECORDER_CAPACITY,
        )
    }

    /// Locked monitor for a queue under construction.
    pub(crate) fn bound_to(
        fabric: Arc<dyn EventFabric>,
        heartbeat_topic: String,
        consumer_id: ConsumerId,
        queue_id: String,
        capacity: usize,
    ) -> QueueResult<Self> {
        Self::with_target(
            fabric,
            Target {
                heartbeat_topic,
                consumer_id,
                queue_id: Some(queue_id),
            },
            true,
            capacity,
        )
    }

    fn with_target(
        fabric: Arc<dyn EventFabric>,
        target: Target,
        locked: bool,
        capacity: usize,
    ) -> QueueResult<Self> {
        let monitor = Self {
            fabric,
            target: Arc::new(RwLock::new(target)),
            recorder: Arc::new(Mutex::new(HeartbeatRecorder::new(capacity))),
            locked,
            listener: Mutex::new(None),
        };
        monitor.listen()?;
        Ok(monitor)
    }

    /// (Re)subscribe to the current target's heartbeat topic.
    fn listen(&self) -> QueueResult<()> {
        let topic = self.heartbeat_topic();
        let mut receiver = self.fabric.subscribe(&topic)?;
        let target = Arc::clone(&self.target);
        let recorder = Arc::clone(&self.recorder);

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(FabricMessage::Heartbeat(beat)) => {
                        let wanted = target
                            .read()
                            .unwrap_or_else(PoisonError::into_inner)
                            .consumer_id;
                        if beat.consumer_id == wanted {
                            lock(&recorder).record(beat);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Heartbeat monitor on {} skipped {} messages", topic, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = lock(&self.listener).replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn ensure_unlocked(&self) -> QueueResult<()> {
        if self.locked {
            tracing::error!("Heartbeat monitor is locked to consumer {}", self.consumer_id());
            return Err(QueueError::IllegalState(format!(
                "heartbeat monitor is locked to consumer {}",
                self.consumer_id()
            )));
        }
        Ok(())
    }

    fn retarget(&self, next: Target) -> QueueResult<()> {
        self.ensure_unlocked()?;
        let topic_changed = {
            let mut target = self.target.write().unwrap_or_else(PoisonError::into_inner);
            let changed = target.heartbeat_topic != next.heartbeat_topic;
            *target = next;
            changed
        };
        lock(&self.recorder).clear();
        if topic_changed {
            self.listen()?;
        }
        Ok(())
    }

    /// Point the monitor at another consumer on the same topic.
    pub fn set_consumer_id(&self, consumer_id: ConsumerId) -> QueueResult<()> {
        let heartbeat_topic = self.heartbeat_topic();
        self.retarget(Target {
            heartbeat_topic,
            consumer_id,
            queue_id: None,
        })
    }

    /// Point the monitor at the consumer bound to `queue`.
    pub fn set_queue(&self, queue: &Queue) -> QueueResult<()> {
        self.retarget(Target {
            heartbeat_topic: queue.names().heartbeat_topic.clone(),
            consumer_id: queue.consumer_id(),
            queue_id: Some(queue.queue_id().to_string()),
        })
    }

    /// Point the monitor at the consumer of `queue_id` in `service`.
    pub async fn set_queue_id(&self, queue_id: &str, service: &QueueService) -> QueueResult<()> {
        self.ensure_unlocked()?;
        let queue = service.get_queue(queue_id).await?;
        self.set_queue(&queue)
    }

    /// Heartbeats received since subscription, oldest first.
    pub fn get_latest_heartbeats(&self) -> Vec<HeartbeatBean> {
        lock(&self.recorder).recording()
    }

    pub fn get_last_heartbeat(&self) -> Option<HeartbeatBean> {
        lock(&self.recorder).last()
    }

    /// Time since the most recent heartbeat was published.
    pub fn last_heartbeat_age(&self) -> Option<chrono::Duration> {
        self.get_last_heartbeat()
            .map(|beat| Utc::now().signed_duration_since(beat.publish_time))
    }

    pub fn consumer_id(&self) -> ConsumerId {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .consumer_id
    }

    pub fn queue_id(&self) -> Option<String> {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .queue_id
            .clone()
    }

    pub fn heartbeat_topic(&self) -> String {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .heartbeat_topic
            .clone()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn recorder_capacity(&self) -> usize {
        lock(&self.recorder).capacity()
    }

    pub fn set_recorder_capacity(&self, capacity: usize) {
        lock(&self.recorder).set_capacity(capacity);
    }

    /// Stop listening; recorded heartbeats stay readable.
    pub fn stop(&self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("target", &*self.target.read().unwrap_or_else(PoisonError::into_inner))
            .field("locked", &self.locked)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::ConsumerState;

    fn beat(consumer_id: ConsumerId, n: u64) -> HeartbeatBean {
        HeartbeatBean {
            consumer_id,
            consumer_name: "r.job-queue".to_string(),
            publish_time: Utc::now(),
            conception_time: Utc::now(),
            beat: n,
            consumer_state: ConsumerState::Running,
            current_item: None,
        }
    }

    #[test]
    fn recorder_keeps_insertion_order() {
        let id = ConsumerId::new();
        let mut recorder = HeartbeatRecorder::default();
        assert!(recorder.last().is_none());
        for n in 1..=3 {
            recorder.record(beat(id, n));
        }
        let beats: Vec<_> = recorder.recording().iter().map(|b| b.beat).collect();
        assert_eq!(beats, [1, 2, 3]);
        assert_eq!(recorder.last().map(|b| b.beat), Some(3));
        // Reading does not drain.
        assert_eq!(recorder.len(), 3);
    }

    #[test]
    fn recorder_evicts_oldest() {
        let id = ConsumerId::new();
        let mut recorder = HeartbeatRecorder::new(2);
        for n in 1..=5 {
            recorder.record(beat(id, n));
        }
        let beats: Vec<_> = recorder.recording().iter().map(|b| b.beat).collect();
        assert_eq!(beats, [4, 5]);

        recorder.set_capacity(1);
        assert_eq!(recorder.recording().len(), 1);
        assert_eq!(recorder.last().map(|b| b.beat), Some(5));
    }
}
