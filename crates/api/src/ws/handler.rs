use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use testdeck_core::status::Severity;
use testdeck_events::RunEvent;

use crate::state::AppState;

/// Sent to an observer that joins while a run is executing.
pub const RUN_IN_PROGRESS_NOTICE: &str = "Connected while a test run is in progress";

/// GET /api/v1/ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| observe(socket, state))
}

/// Serve one observer until it disconnects.
///
/// Run events arrive through the observer's queue in `WsManager`; inbound
/// frames are read only to notice Close and keep the socket alive.
async fn observe(socket: WebSocket, state: AppState) {
    let manager = Arc::clone(&state.ws_manager);
    let (id, mut rx) = manager.add().await;
    tracing::info!(observer = %id, "Observer connected");

    if state.orchestrator.is_running() {
        manager
            .send_event(id, &RunEvent::log(RUN_IN_PROGRESS_NOTICE, Severity::Info))
            .await;
    }

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if sink.send(frame).await.is_err() || closing {
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => tracing::trace!(observer = %id, "Pong received"),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(observer = %id, error = %e, "Observer receive error");
                break;
            }
        }
    }

    manager.remove(id).await;
    send_task.abort();
    tracing::info!(observer = %id, "Observer disconnected");
}
