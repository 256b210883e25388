//! Control plane for the queue system.
//!
//! This crate ties the fabric and the execution engine into:
//! - `Queue` - one queue identity, its consumer and its heartbeat monitor
//! - `QueueService` - the job queue plus a registry of active queues, with
//!   start/stop/dispose rules enforced by a Ractor actor
//! - `QueueController` - validated client operations, resolving queue
//!   metadata either in-process (`LocalResolver`) or over a request
//!   channel (`RemoteResolver`, answered by `QueueResponder`)
//!
//! # Usage
//!
//! ```ignore
//! use queue_service::{ServiceConfig, init_queue_system};
//!
//! let config = ServiceConfig::new("i22", "mem://beamline");
//! let system = init_queue_system(config, job_processors, active_processors).await?;
//!
//! let controller = system.local_controller();
//! let job_queue = controller.job_queue_id().await?;
//! controller.submit(&QueueItem::task("alignment"), &job_queue).await?;
//! ```

mod config;
mod controller;
mod heartbeat;
mod init;
mod logging;
mod messages;
mod queue;
mod resolver;
mod responder;
mod service;
mod service_actor;

pub use config::ServiceConfig;
pub use controller::{LocalQueueController, QueueController, RemoteQueueController};
pub use heartbeat::{DEFAULT_RECORDER_CAPACITY, HeartbeatMonitor, HeartbeatRecorder};
pub use init::{QueueSystem, init_queue_system};
pub use logging::init_logging;
pub use messages::{ServiceMessage, ServiceSnapshot};
pub use queue::{Queue, QueueContext};
pub use resolver::{LocalResolver, MetadataResolver, RemoteResolver, find_bean_status};
pub use responder::{QueueResponder, answer};
pub use service::QueueService;
pub use service_actor::{FabricSlot, ServiceActor, ServiceArgs, ServiceState};
