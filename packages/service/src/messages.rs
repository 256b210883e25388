//! Message types for the service actor.

use std::sync::Arc;

use actors::ProcessorFactory;
use queue_core::QueueResult;
use ractor::RpcReplyPort;
use serde::{Deserialize, Serialize};

use crate::queue::Queue;

/// Point-in-time view of the service's configuration and registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub queue_root: Option<String>,
    pub uri: Option<String>,
    pub heartbeat_topic: Option<String>,
    pub command_set: Option<String>,
    pub command_topic: Option<String>,
    pub job_queue_id: Option<String>,
    pub initialized: bool,
    pub active: bool,
    pub active_queue_ids: Vec<String>,
}

/// Messages for the ServiceActor.
#[derive(Debug)]
pub enum ServiceMessage {
    /// Derive names and create the job queue.
    Init { reply: RpcReplyPort<QueueResult<()>> },

    /// Start the job queue.
    Start { reply: RpcReplyPort<QueueResult<()>> },

    /// Stop every queue and deregister all active queues.
    Stop {
        force: bool,
        reply: RpcReplyPort<QueueResult<()>>,
    },

    /// Stop, then dispose the job queue and forget derived names.
    Dispose { reply: RpcReplyPort<QueueResult<()>> },

    /// Create a new active queue; replies with its id.
    RegisterActiveQueue { reply: RpcReplyPort<QueueResult<String>> },

    DeregisterActiveQueue {
        queue_id: String,
        force: bool,
        reply: RpcReplyPort<QueueResult<()>>,
    },

    StartActiveQueue {
        queue_id: String,
        reply: RpcReplyPort<QueueResult<()>>,
    },

    StopActiveQueue {
        queue_id: String,
        force: bool,
        reply: RpcReplyPort<QueueResult<()>>,
    },

    /// Resolve the job queue or any active queue.
    GetQueue {
        queue_id: String,
        reply: RpcReplyPort<QueueResult<Arc<Queue>>>,
    },

    GetJobQueue { reply: RpcReplyPort<QueueResult<Arc<Queue>>> },

    GetActiveQueue {
        queue_id: String,
        reply: RpcReplyPort<QueueResult<Arc<Queue>>>,
    },

    /// Publish a kill command to a queue's consumer.
    KillQueue {
        queue_id: String,
        disconnect: bool,
        exit_process: bool,
        reply: RpcReplyPort<QueueResult<()>>,
    },

    SetQueueRoot {
        queue_root: String,
        reply: RpcReplyPort<QueueResult<()>>,
    },

    SetUri {
        uri: String,
        reply: RpcReplyPort<QueueResult<()>>,
    },

    SetJobQueueProcessor {
        processors: Arc<ProcessorFactory>,
        reply: RpcReplyPort<QueueResult<()>>,
    },

    SetActiveQueueProcessor {
        processors: Arc<ProcessorFactory>,
        reply: RpcReplyPort<QueueResult<()>>,
    },

    GetSnapshot { reply: RpcReplyPort<QueueResult<ServiceSnapshot>> },
}
