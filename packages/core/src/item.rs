//! Work items carried by queues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::status::Status;

/// Unique identifier for a queue item, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Ulid);

impl ItemId {
    /// Create a new unique item ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse an item ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which kind of queue an item may be submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Legal only in the job queue.
    TopLevel,
    /// Legal only in an active queue.
    Atom,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::TopLevel => write!(f, "top-level item"),
            ItemKind::Atom => write!(f, "queue atom"),
        }
    }
}

/// Closed set of concrete item types; processors are registered per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// An experiment-level task made of sub-tasks.
    Task,
    /// A group of atoms run together in one active queue.
    SubTask,
    /// Move one or more devices to a position.
    Move,
    /// Run a scan.
    Scan,
    /// Read back a monitored value.
    Monitor,
}

impl ItemType {
    pub const ALL: [ItemType; 5] = [
        ItemType::Task,
        ItemType::SubTask,
        ItemType::Move,
        ItemType::Scan,
        ItemType::Monitor,
    ];

    pub fn kind(self) -> ItemKind {
        match self {
            ItemType::Task => ItemKind::TopLevel,
            ItemType::SubTask | ItemType::Move | ItemType::Scan | ItemType::Monitor => {
                ItemKind::Atom
            }
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemType::Task => write!(f, "task"),
            ItemType::SubTask => write!(f, "sub_task"),
            ItemType::Move => write!(f, "move"),
            ItemType::Scan => write!(f, "scan"),
            ItemType::Monitor => write!(f, "monitor"),
        }
    }
}

/// A unit of work submitted to a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub name: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub previous_status: Status,
    #[serde(default)]
    pub percent_complete: f64,
    /// Human-readable progress message, updated on broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Processor-specific parameters.
    #[serde(default)]
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// Create a new item of the given type with status `NONE`.
    pub fn new(item_type: ItemType, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::new(),
            name: name.into(),
            item_type,
            status: Status::None,
            previous_status: Status::None,
            percent_complete: 0.0,
            message: None,
            payload: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// Shorthand for a top-level task destined for the job queue.
    pub fn task(name: impl Into<String>) -> Self {
        Self::new(ItemType::Task, name)
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn kind(&self) -> ItemKind {
        self.item_type.kind()
    }

    /// Record a status change, keeping the previous status.
    pub fn set_status(&mut self, status: Status) {
        if self.status != status {
            self.previous_status = self.status;
            self.status = status;
        }
        self.updated_at = Utc::now();
    }

    /// Percent is clamped to `0..=100`.
    pub fn set_percent_complete(&mut self, percent: f64) {
        self.percent_complete = percent.clamp(0.0, 100.0);
        self.updated_at = Utc::now();
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_kinds() {
        for item_type in ItemType::ALL {
            let expected = if item_type == ItemType::Task {
                ItemKind::TopLevel
            } else {
                ItemKind::Atom
            };
            assert_eq!(item_type.kind(), expected);
            // Display and the wire name agree.
            assert_eq!(
                serde_json::to_string(&item_type).unwrap(),
                format!("\"{}\"", item_type)
            );
        }
    }

    #[test]
    fn set_status_tracks_previous() {
        let mut item = QueueItem::task("align");
        item.set_status(Status::Submitted);
        item.set_status(Status::Running);
        assert_eq!(item.status, Status::Running);
        assert_eq!(item.previous_status, Status::Submitted);

        item.set_status(Status::Running);
        assert_eq!(item.previous_status, Status::Submitted);
    }

    #[test]
    fn percent_is_clamped() {
        let mut item = QueueItem::new(ItemType::Scan, "grid");
        item.set_percent_complete(140.0);
        assert_eq!(item.percent_complete, 100.0);
        item.set_percent_complete(-3.0);
        assert_eq!(item.percent_complete, 0.0);
    }

    #[test]
    fn item_id_parse() {
        let id = ItemId::new();
        assert_eq!(ItemId::parse(&id.to_string()).unwrap(), id);
        assert!(ItemId::parse("not-a-ulid").is_err());
    }
}
