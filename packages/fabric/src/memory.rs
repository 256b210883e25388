//! Single-process fabric backed by tokio channels.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use queue_core::{ConsumerId, FabricMessage, ItemId, QueueItem};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::connection::{EventFabric, FabricConfig, FabricError, FabricFuture, PendingRequest};

/// In-memory [`EventFabric`].
pub struct InMemoryFabric {
    config: FabricConfig,
    connected: AtomicBool,
    topics: RwLock<HashMap<String, broadcast::Sender<FabricMessage>>>,
    lists: RwLock<HashMap<String, VecDeque<QueueItem>>>,
    responders: RwLock<HashMap<String, mpsc::Sender<PendingRequest>>>,
    consumers: RwLock<HashMap<ConsumerId, String>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryFabric {
    pub fn new(config: FabricConfig) -> Self {
        Self {
            config,
            connected: AtomicBool::new(true),
            topics: RwLock::new(HashMap::new()),
            lists: RwLock::new(HashMap::new()),
            responders: RwLock::new(HashMap::new()),
            consumers: RwLock::new(HashMap::new()),
        }
    }

    /// Number of consumer identities currently allocated.
    pub fn consumer_count(&self) -> usize {
        read(&self.consumers).len()
    }

    pub fn list_count(&self) -> usize {
        read(&self.lists).len()
    }

    pub fn topic_count(&self) -> usize {
        read(&self.topics).len()
    }

    fn ensure_connected(&self) -> Result<(), FabricError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FabricError::Disconnected)
        }
    }

    fn topic(&self, topic: &str) -> broadcast::Sender<FabricMessage> {
        if let Some(sender) = read(&self.topics).get(topic) {
            return sender.clone();
        }
        write(&self.topics)
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.config.topic_capacity).0)
            .clone()
    }

    fn with_list<R>(
        &self,
        list: &str,
        f: impl FnOnce(&mut VecDeque<QueueItem>) -> R,
    ) -> Result<R, FabricError> {
        self.ensure_connected()?;
        let mut lists = write(&self.lists);
        Ok(f(lists.entry(list.to_string()).or_default()))
    }
}

impl Default for InMemoryFabric {
    fn default() -> Self {
        Self::new(FabricConfig::memory())
    }
}

impl std::fmt::Debug for InMemoryFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryFabric")
            .field("uri", &self.config.uri)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl EventFabric for InMemoryFabric {
    fn uri(&self) -> &str {
        &self.config.uri
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn create_consumer(&self, name: &str) -> Result<ConsumerId, FabricError> {
        self.ensure_connected()?;
        let consumer_id = ConsumerId::new();
        write(&self.consumers).insert(consumer_id, name.to_string());
        tracing::debug!("Created consumer {} for {}", consumer_id, name);
        Ok(consumer_id)
    }

    fn release_consumer(&self, consumer_id: ConsumerId) {
        if let Some(name) = write(&self.consumers).remove(&consumer_id) {
            tracing::debug!("Released consumer {} for {}", consumer_id, name);
        }
    }

    fn publish(&self, topic: &str, message: FabricMessage) -> Result<(), FabricError> {
        self.ensure_connected()?;
        // No receivers is not an error; publication is fire-and-forget.
        let _ = self.topic(topic).send(message);
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<FabricMessage>, FabricError> {
        self.ensure_connected()?;
        Ok(self.topic(topic).subscribe())
    }

    fn append(&self, list: &str, item: QueueItem) -> Result<(), FabricError> {
        self.with_list(list, |items| items.push_back(item))
    }

    fn pop_front(&self, list: &str) -> Result<Option<QueueItem>, FabricError> {
        self.with_list(list, |items| items.pop_front())
    }

    fn remove(&self, list: &str, item_id: ItemId) -> Result<bool, FabricError> {
        self.with_list(list, |items| {
            match items.iter().position(|item| item.id == item_id) {
                Some(index) => items.remove(index).is_some(),
                None => false,
            }
        })
    }

    fn reorder(&self, list: &str, item_id: ItemId, move_by: i32) -> Result<bool, FabricError> {
        self.with_list(list, |items| {
            let Some(index) = items.iter().position(|item| item.id == item_id) else {
                return false;
            };
            let last = items.len().saturating_sub(1) as i64;
            let target = (index as i64 - i64::from(move_by)).clamp(0, last) as usize;
            if let Some(item) = items.remove(index) {
                items.insert(target, item);
            }
            true
        })
    }

    fn upsert(&self, list: &str, item: QueueItem) -> Result<(), FabricError> {
        self.with_list(list, |items| {
            match items.iter_mut().find(|existing| existing.id == item.id) {
                Some(existing) => *existing = item,
                None => items.push_back(item),
            }
        })
    }

    fn clear(&self, list: &str) -> Result<(), FabricError> {
        self.with_list(list, |items| items.clear())
    }

    fn drop_list(&self, list: &str) {
        if write(&self.lists).remove(list).is_some() {
            tracing::debug!("Dropped list {}", list);
        }
    }

    fn drop_topic(&self, topic: &str) {
        if write(&self.topics).remove(topic).is_some() {
            tracing::debug!("Dropped topic {}", topic);
        }
    }

    fn snapshot(&self, list: &str) -> Result<Vec<QueueItem>, FabricError> {
        self.ensure_connected()?;
        Ok(read(&self.lists)
            .get(list)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn request(
        &self,
        channel: &str,
        message: FabricMessage,
        timeout: Duration,
    ) -> FabricFuture<'_, FabricMessage> {
        let channel = channel.to_string();
        let responder = self
            .ensure_connected()
            .map(|()| read(&self.responders).get(&channel).cloned());

        Box::pin(async move {
            let Some(responder) = responder? else {
                return Err(FabricError::NoResponder(channel));
            };
            let timed_out = || FabricError::Timeout {
                channel: channel.clone(),
                timeout_ms: timeout.as_millis() as u64,
            };

            let (tx, rx) = oneshot::channel();
            let deadline = tokio::time::Instant::now() + timeout;
            match tokio::time::timeout_at(deadline, responder.send(PendingRequest::new(message, tx)))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(FabricError::NoResponder(channel)),
                Err(_) => return Err(timed_out()),
            }

            match tokio::time::timeout_at(deadline, rx).await {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(_)) => Err(FabricError::Closed(channel)),
                Err(_) => Err(timed_out()),
            }
        })
    }

    fn serve(&self, channel: &str) -> Result<mpsc::Receiver<PendingRequest>, FabricError> {
        self.ensure_connected()?;
        let (tx, rx) = mpsc::channel(self.config.request_capacity);
        if write(&self.responders)
            .insert(channel.to_string(), tx)
            .is_some()
        {
            tracing::warn!("Replacing existing responder on channel {}", channel);
        }
        Ok(rx)
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::info!("Disconnecting fabric: {}", self.config.uri);
            write(&self.topics).clear();
            write(&self.responders).clear();
            write(&self.consumers).clear();
        }
    }
}
