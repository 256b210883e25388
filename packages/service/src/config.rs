//! Service configuration.

use std::time::Duration;

use actors::ConsumerSettings;
use serde::{Deserialize, Serialize};

/// Queue service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name-root every queue, topic and set name is derived from.
    pub queue_root: Option<String>,
    /// Transport address of the messaging fabric.
    pub uri: Option<String>,
    pub heartbeat_interval_ms: u64,
    pub poll_interval_ms: u64,
    /// How long a remote metadata request waits for its reply.
    pub request_timeout_ms: u64,
    /// How long a terminated item may ignore the request before it is aborted.
    pub terminate_grace_ms: u64,
    /// How long stopping a queue waits for its consumer to exit.
    pub stop_timeout_ms: u64,
    /// Heartbeats retained per monitor.
    pub heartbeat_capacity: usize,
    /// Request/response channel served by the remote responder.
    pub request_channel: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_root: None,
            uri: None,
            heartbeat_interval_ms: 1000,
            poll_interval_ms: 50,
            request_timeout_ms: 5000,
            terminate_grace_ms: 2000,
            stop_timeout_ms: 5000,
            heartbeat_capacity: 100,
            request_channel: "queue-service.request".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Create a config with the given name-root and transport address.
    pub fn new(queue_root: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::default().with_queue_root(queue_root).with_uri(uri)
    }

    /// Overlay `QUEUE_ROOT`, `QUEUE_URI`, `QUEUE_HEARTBEAT_MS` and
    /// `QUEUE_REQUEST_TIMEOUT_MS` from the environment on the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var("QUEUE_ROOT") {
            config.queue_root = Some(root);
        }
        if let Ok(uri) = std::env::var("QUEUE_URI") {
            config.uri = Some(uri);
        }
        if let Some(ms) = env_millis("QUEUE_HEARTBEAT_MS") {
            config.heartbeat_interval_ms = ms;
        }
        if let Some(ms) = env_millis("QUEUE_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = ms;
        }
        config
    }

    pub fn with_queue_root(mut self, queue_root: impl Into<String>) -> Self {
        self.queue_root = Some(queue_root.into());
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    pub fn with_terminate_grace_ms(mut self, ms: u64) -> Self {
        self.terminate_grace_ms = ms;
        self
    }

    pub fn with_stop_timeout_ms(mut self, ms: u64) -> Self {
        self.stop_timeout_ms = ms;
        self
    }

    pub fn with_heartbeat_capacity(mut self, capacity: usize) -> Self {
        self.heartbeat_capacity = capacity;
        self
    }

    pub fn with_request_channel(mut self, channel: impl Into<String>) -> Self {
        self.request_channel = channel.into();
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Timing handed to each queue's consumer.
    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings::default()
            .with_heartbeat_interval(self.heartbeat_interval())
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_terminate_grace(Duration::from_millis(self.terminate_grace_ms))
    }
}

fn env_millis(key: &str) -> Option<u64> {
    let value = std::env::var(key).ok()?;
    match value.parse() {
        Ok(ms) => Some(ms),
        Err(_) => {
            tracing::warn!("Ignoring {}={}: not a number of milliseconds", key, value);
            None
        }
    }
}
