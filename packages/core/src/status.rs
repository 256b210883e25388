//! Lifecycle states for queue items and for queues themselves.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single queue item.
///
/// `REQUEST_*` states are written by a controller to ask the running
/// process to change state; the process acknowledges by moving to the
/// corresponding settled state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    None,
    Submitted,
    Running,
    RequestPause,
    Paused,
    RequestResume,
    RequestTerminate,
    Terminated,
    Complete,
    Failed,
}

impl Status {
    /// Terminal states never change again.
    pub fn is_final(self) -> bool {
        matches!(self, Status::Complete | Status::Terminated | Status::Failed)
    }

    pub fn is_running(self) -> bool {
        self == Status::Running
    }

    pub fn is_paused(self) -> bool {
        matches!(self, Status::RequestPause | Status::Paused)
    }

    pub fn is_resumed(self) -> bool {
        self == Status::RequestResume
    }

    pub fn is_terminated(self) -> bool {
        matches!(self, Status::RequestTerminate | Status::Terminated)
    }

    /// Whether this status is a controller request awaiting acknowledgement.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Status::RequestPause | Status::RequestResume | Status::RequestTerminate
        )
    }

    /// Whether the item has been picked up by a process and not yet settled.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Status::Running
                | Status::RequestPause
                | Status::Paused
                | Status::RequestResume
                | Status::RequestTerminate
        )
    }

    /// Whether moving from `self` to `next` follows the item state machine.
    ///
    /// Any active state may fail or be terminated; the happy path is
    /// `NONE -> SUBMITTED -> RUNNING -> COMPLETE`.
    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::*;

        if self.is_final() {
            return false;
        }
        if self == next {
            return true;
        }
        match (self, next) {
            (None, Submitted) | (None, Running) => true,
            (Submitted, Running) | (Submitted, Terminated) | (Submitted, Failed) => true,
            (Running, RequestPause | RequestTerminate | Complete | Terminated | Failed) => true,
            (RequestPause, Paused | Running | RequestTerminate | Complete | Terminated | Failed) => {
                true
            }
            (Paused, RequestResume | Running | RequestTerminate | Terminated | Failed) => true,
            (RequestResume, Running | RequestTerminate | Terminated | Failed) => true,
            (RequestTerminate, Terminated | Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::None => "NONE",
            Status::Submitted => "SUBMITTED",
            Status::Running => "RUNNING",
            Status::RequestPause => "REQUEST_PAUSE",
            Status::Paused => "PAUSED",
            Status::RequestResume => "REQUEST_RESUME",
            Status::RequestTerminate => "REQUEST_TERMINATE",
            Status::Terminated => "TERMINATED",
            Status::Complete => "COMPLETE",
            Status::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a queue.
///
/// `INITIALISED -> STARTED <-> STOPPED`; `KILLED` and `DISPOSED` are
/// terminal for the queue instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    #[default]
    Initialised,
    Started,
    Stopped,
    Killed,
    Disposed,
}

impl QueueStatus {
    pub fn is_startable(self) -> bool {
        matches!(self, QueueStatus::Initialised | QueueStatus::Stopped)
    }

    pub fn is_active(self) -> bool {
        self == QueueStatus::Started
    }

    /// No further start succeeds once a queue reaches a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Killed | QueueStatus::Disposed)
    }

    pub fn can_transition_to(self, next: QueueStatus) -> bool {
        use QueueStatus::*;

        match (self, next) {
            (Initialised | Stopped, Started) => true,
            (Started, Stopped | Killed) => true,
            (Initialised | Stopped, Disposed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Initialised => "INITIALISED",
            QueueStatus::Started => "STARTED",
            QueueStatus::Stopped => "STOPPED",
            QueueStatus::Killed => "KILLED",
            QueueStatus::Disposed => "DISPOSED",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
