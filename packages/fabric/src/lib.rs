//! Messaging fabric for the queue control plane.
//!
//! This crate defines the [`EventFabric`] interface the control plane
//! consumes: ordered submission lists, status sets, publish/subscribe
//! topics, request/response channels and consumer identity allocation.
//!
//! # Backends
//!
//! - `mem://` : [`InMemoryFabric`], a single-process fabric used by tests
//!   and embedded deployments

mod connection;
mod memory;

pub use connection::{
    EventFabric, FabricConfig, FabricError, FabricFuture, PendingRequest, connect,
};
pub use memory::InMemoryFabric;
