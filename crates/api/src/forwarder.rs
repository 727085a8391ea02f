//! Bus-to-WebSocket bridge.
//!
//! [`EventForwarder`] subscribes to the [`EventBus`](testdeck_events::EventBus)
//! and pushes every [`RunEvent`] to all connected observers as a JSON text
//! frame, in publication order.

use std::sync::Arc;

use tokio::sync::broadcast;

use testdeck_events::RunEvent;

use crate::ws::WsManager;

pub struct EventForwarder {
    ws_manager: Arc<WsManager>,
}

impl EventForwarder {
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Run the forwarding loop.
    ///
    /// The loop exits when the channel is closed (i.e. the bus is dropped).
    pub async fn run(self, mut receiver: broadcast::Receiver<RunEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let observers = self.ws_manager.broadcast_event(&event).await;
                    tracing::trace!(kind = event.kind(), observers, "Event forwarded");
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event forwarder lagged, observers missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, forwarder shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::ws::Message;
    use testdeck_core::status::Severity;
    use testdeck_events::EventBus;

    use super::*;

    #[tokio::test]
    async fn events_reach_every_observer_as_json_text() {
        let bus = Arc::new(EventBus::default());
        let ws_manager = Arc::new(WsManager::new());
        let (_id, mut rx) = ws_manager.add().await;

        let handle = tokio::spawn(EventForwarder::new(Arc::clone(&ws_manager)).run(bus.subscribe()));
        bus.publish(RunEvent::log("hello", Severity::Info));

        let msg = rx.recv().await.expect("forwarded message");
        let Message::Text(text) = msg else {
            panic!("expected a text frame, got {msg:?}");
        };
        let json: serde_json::Value = serde_json::from_str(text.as_str()).expect("valid json");
        assert_eq!(json["type"], "LOG");
        assert_eq!(json["payload"]["message"], "hello");
        assert_eq!(json["payload"]["status"], "INFO");

        drop(bus);
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("forwarder stops when the bus closes")
            .expect("task joins");
    }
}
