//! Message types for actor communication.

use queue_core::{ConsumerState, ItemId, QueueItem, QueueResult};
use ractor::RpcReplyPort;

/// Messages for the ConsumerActor.
#[derive(Debug)]
pub enum ConsumerMessage {
    /// Take the next item off the submission list if idle.
    Poll,

    /// Publish a heartbeat.
    Heartbeat,

    /// Pause or resume dequeuing.
    Pause { pause: bool },

    /// Terminate the running item and stop.
    Kill {
        disconnect: bool,
        exit_process: bool,
    },

    /// A controller request for an item, seen on the status topic.
    ItemRequest { item: Box<QueueItem> },

    /// The running item has settled.
    ProcessFinished {
        item_id: ItemId,
        result: QueueResult<QueueItem>,
    },

    /// Check if the consumer is idle.
    IsIdle { reply: RpcReplyPort<bool> },

    /// Get whether the consumer is dequeuing.
    GetState { reply: RpcReplyPort<ConsumerState> },

    /// Stop dequeuing, terminate the running item and stop.
    Shutdown,
}
