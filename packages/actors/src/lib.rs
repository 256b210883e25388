//! Execution engine for queue items.
//!
//! This crate provides the processor contract and the Ractor-based
//! consumer that executes one queue's items.
//!
//! # Architecture
//!
//! - `ProcessorFactory` - Maps item types to processor constructors
//! - `QueueProcess` - One execution of one item, with pause/resume/terminate
//! - `StatusPublisher` - Writes item updates to the status set and topic
//! - `ConsumerActor` - Dequeues items one at a time, heartbeats, obeys
//!   pause and kill commands addressed to its consumer id
//!
//! # Usage
//!
//! ```ignore
//! use actors::{ProcessorFactory, QueueProcess, StatusPublisher};
//!
//! let mut processors = ProcessorFactory::new();
//! processors.register_processor(ItemType::Scan, || ScanProcessor::default());
//!
//! let publisher = StatusPublisher::for_queue(fabric, &names);
//! let process = processors.get_processor(item, publisher, true)?;
//! let settled = process.execute().await?;
//! ```

mod consumer_actor;
mod messages;
mod process;
mod processor;
mod publisher;

pub use consumer_actor::{ConsumerActor, ConsumerActorState, ConsumerArgs, ConsumerSettings};
pub use messages::ConsumerMessage;
pub use process::{ControlSignal, DEFAULT_TERMINATE_GRACE, Flow, ProcessContext, QueueProcess};
pub use processor::{Processor, ProcessorConstructor, ProcessorFactory, ProcessorFuture};
pub use publisher::StatusPublisher;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
