//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`RunEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use testdeck_core::status::{ModuleStatus, Severity};

// ---------------------------------------------------------------------------
// RunEvent
// ---------------------------------------------------------------------------

/// An observer-facing event.
///
/// Serializes as `{"type": "LOG" | "MODULE" | "RUN_COMPLETE" | "METRIC",
/// "payload": {...}}`. Frontends depend on this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunEvent {
    /// One log line.
    Log { message: String, status: Severity },

    /// A module state transition.
    Module {
        module: String,
        status: ModuleStatus,
        #[serde(default)]
        message: String,
    },

    /// A report for the finished run is ready.
    RunComplete { report_url: String },

    /// Free-form device metrics (CPU, memory, ...).
    Metric(serde_json::Value),
}

impl RunEvent {
    pub fn log(message: impl Into<String>, status: Severity) -> Self {
        Self::Log {
            message: message.into(),
            status,
        }
    }

    pub fn module(
        module: impl Into<String>,
        status: ModuleStatus,
        message: impl Into<String>,
    ) -> Self {
        Self::Module {
            module: module.into(),
            status,
            message: message.into(),
        }
    }

    /// The `type` tag, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Log { .. } => "LOG",
            Self::Module { .. } => "MODULE",
            Self::RunComplete { .. } => "RUN_COMPLETE",
            Self::Metric(_) => "METRIC",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`RunEvent`].
///
/// # Usage
///
/// ```rust
/// use testdeck_core::status::Severity;
/// use testdeck_events::bus::{EventBus, RunEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(RunEvent::log("hello", Severity::Info));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: RunEvent) {
        // A SendError only means there are zero receivers.
        if self.sender.send(event).is_err() {
            tracing::trace!("Event dropped, no subscribers");
        }
    }

    /// Subscribe to all events published on this bus from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
