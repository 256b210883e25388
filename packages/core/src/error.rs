//! Error type shared by every layer of the control plane.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to callers of queue operations.
///
/// Serializable so a remote responder can hand the failure back to the
/// requesting controller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum QueueError {
    /// Item kind does not match the target queue.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Operation forbidden in the current lifecycle state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Operation permanently disallowed in the current context.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// A processor failed while running an item.
    #[error("process failed: {0}")]
    Process(String),
}

impl QueueError {
    /// Fabric failures, including request timeouts.
    pub fn is_transport(&self) -> bool {
        matches!(self, QueueError::Transport(_) | QueueError::Timeout(_))
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_transport_class() {
        assert!(QueueError::Timeout("request".into()).is_transport());
        assert!(QueueError::Transport("closed".into()).is_transport());
        assert!(!QueueError::IllegalState("started".into()).is_transport());
    }

    #[test]
    fn error_survives_serialization() {
        let err = QueueError::NotFound("queue r.aq-9.active-queue".into());
        let json = serde_json::to_string(&err).unwrap();
        let back: QueueError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
