//! Registry of connected run observers.
//!
//! Observers are read-only: they receive every [`RunEvent`] as a JSON text
//! frame and never send anything the server acts on. Each event is encoded
//! once and the same frame is queued for every observer.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes};
use testdeck_core::types::Timestamp;
use testdeck_events::RunEvent;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Identifies one WebSocket observer for its lifetime.
pub type ObserverId = Uuid;

/// Outbound frame queue of one observer.
pub type WsSender = mpsc::UnboundedSender<Message>;

struct Observer {
    sender: WsSender,
    connected_at: Timestamp,
    events_delivered: u64,
}

/// Tracks connected observers and fans run events out to them.
pub struct WsManager {
    observers: RwLock<HashMap<ObserverId, Observer>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new observer.
    ///
    /// Returns its id and the receiving end of its frame queue; the caller
    /// drains the queue into the socket.
    pub async fn add(&self) -> (ObserverId, mpsc::UnboundedReceiver<Message>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.write().await.insert(
            id,
            Observer {
                sender: tx,
                connected_at: chrono::Utc::now(),
                events_delivered: 0,
            },
        );
        (id, rx)
    }

    pub async fn remove(&self, id: ObserverId) {
        if let Some(observer) = self.observers.write().await.remove(&id) {
            let connected_secs = (chrono::Utc::now() - observer.connected_at).num_seconds();
            tracing::debug!(
                observer = %id,
                connected_secs,
                events_delivered = observer.events_delivered,
                "Observer removed",
            );
        }
    }

    /// Queue `event` for a single observer. Returns `false` if the
    /// observer is unknown or gone.
    pub async fn send_event(&self, id: ObserverId, event: &RunEvent) -> bool {
        let Some(frame) = encode(event) else {
            return false;
        };
        let mut observers = self.observers.write().await;
        match observers.get_mut(&id) {
            Some(observer) if observer.sender.send(frame).is_ok() => {
                observer.events_delivered += 1;
                true
            }
            _ => false,
        }
    }

    /// Queue `event` for every observer and return how many accepted it.
    ///
    /// Observers whose queue is closed are dropped from the registry.
    pub async fn broadcast_event(&self, event: &RunEvent) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };

        let mut observers = self.observers.write().await;
        let mut gone = Vec::new();
        for (id, observer) in observers.iter_mut() {
            if observer.sender.send(frame.clone()).is_ok() {
                observer.events_delivered += 1;
            } else {
                gone.push(*id);
            }
        }
        for id in &gone {
            observers.remove(id);
            tracing::debug!(observer = %id, "Dropped closed observer");
        }
        observers.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Send a Close frame to every observer and forget them all.
    pub async fn shutdown_all(&self) {
        let mut observers = self.observers.write().await;
        let count = observers.len();
        for observer in observers.values() {
            let _ = observer.sender.send(Message::Close(None));
        }
        observers.clear();
        tracing::info!(count, "Closed all observer connections");
    }

    /// Send a Ping frame to every observer.
    pub async fn ping_all(&self) {
        let observers = self.observers.read().await;
        for observer in observers.values() {
            let _ = observer.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(event: &RunEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(Utf8Bytes::from(text))),
        Err(e) => {
            tracing::error!(error = %e, kind = event.kind(), "Failed to serialize event");
            None
        }
    }
}
