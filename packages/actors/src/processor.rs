//! Processor trait and factory.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use queue_core::{ItemType, QueueError, QueueItem, QueueResult};

use crate::process::{ProcessContext, QueueProcess};
use crate::publisher::StatusPublisher;

/// Future type for async processors.
pub type ProcessorFuture = Pin<Box<dyn Future<Output = QueueResult<()>> + Send>>;

/// Trait for item processors.
///
/// A processor runs one item. It must call [`ProcessContext::checkpoint`]
/// between logical steps so pause and terminate requests are honoured; a
/// processor that never checkpoints is aborted once the terminate grace
/// period expires. Returning `Ok` completes the item, returning `Err`
/// fails it.
pub trait Processor: Send + Sync + 'static {
    /// Run the item to completion.
    fn run(&self, ctx: ProcessContext) -> ProcessorFuture;

    /// Called when a pause is requested, before the run loop observes it.
    fn pause(&self) {}

    /// Called when a resume is requested.
    fn resume(&self) {}

    /// Called when termination is requested.
    fn terminate(&self) {}
}

/// Constructor producing a fresh processor for each execution.
pub type ProcessorConstructor = Arc<dyn Fn() -> Arc<dyn Processor> + Send + Sync>;

/// Registry mapping item types to processor constructors.
#[derive(Default, Clone)]
pub struct ProcessorFactory {
    processors: HashMap<ItemType, ProcessorConstructor>,
}

impl ProcessorFactory {
    /// Create a new empty factory.
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Register a processor for an item type.
    ///
    /// Registering the same type again replaces the earlier entry.
    pub fn register_processor<P, F>(&mut self, item_type: ItemType, constructor: F)
    where
        P: Processor,
        F: Fn() -> P + Send + Sync + 'static,
    {
        if self.processors.contains_key(&item_type) {
            tracing::debug!("Re-registering processor for {}", item_type);
        }
        self.processors.insert(
            item_type,
            Arc::new(move || Arc::new(constructor()) as Arc<dyn Processor>),
        );
    }

    /// Register one processor for several item types.
    pub fn register_processors<P, F>(&mut self, item_types: &[ItemType], constructor: F)
    where
        P: Processor,
        F: Fn() -> P + Clone + Send + Sync + 'static,
    {
        for item_type in item_types {
            self.register_processor(*item_type, constructor.clone());
        }
    }

    /// Builder form of [`register_processor`](Self::register_processor).
    pub fn with_processor<P, F>(mut self, item_type: ItemType, constructor: F) -> Self
    where
        P: Processor,
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.register_processor(item_type, constructor);
        self
    }

    /// Check if a processor exists for an item type.
    pub fn has_processor(&self, item_type: ItemType) -> bool {
        self.processors.contains_key(&item_type)
    }

    /// List all registered item types.
    pub fn item_types(&self) -> Vec<ItemType> {
        let mut item_types: Vec<_> = self.processors.keys().copied().collect();
        item_types.sort();
        item_types
    }

    /// Bind a fresh processor for the item's exact type to a new process.
    pub fn get_processor(
        &self,
        item: QueueItem,
        publisher: StatusPublisher,
        blocking: bool,
    ) -> QueueResult<QueueProcess> {
        let Some(constructor) = self.processors.get(&item.item_type) else {
            tracing::error!("No processor registered for {}", item.item_type);
            return Err(QueueError::NotFound(format!(
                "no processor registered for item type {}",
                item.item_type
            )));
        };
        Ok(QueueProcess::new(item, publisher, constructor(), blocking))
    }
}

impl std::fmt::Debug for ProcessorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorFactory")
            .field("item_types", &self.item_types())
            .finish()
    }
}
