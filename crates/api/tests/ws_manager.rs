//! Unit tests for `WsManager`.
//!
//! These tests exercise the observer registry directly, without performing
//! any HTTP upgrades.

use axum::extract::ws::Message;
use testdeck_api::ws::WsManager;
use testdeck_core::status::{ModuleStatus, Severity};
use testdeck_events::RunEvent;

fn text_json(msg: Message) -> serde_json::Value {
    let Message::Text(text) = msg else {
        panic!("expected a text frame, got {msg:?}");
    };
    serde_json::from_str(text.as_str()).expect("valid json")
}

#[tokio::test]
async fn new_manager_has_zero_connections() {
    let manager = WsManager::new();

    assert_eq!(manager.connection_count().await, 0);
}

#[tokio::test]
async fn add_and_remove_track_connection_count() {
    let manager = WsManager::new();

    let (id, _rx) = manager.add().await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove(id).await;
    assert_eq!(manager.connection_count().await, 0);
}

#[tokio::test]
async fn observers_get_distinct_ids() {
    let manager = WsManager::new();

    let (a, _rx_a) = manager.add().await;
    let (b, _rx_b) = manager.add().await;

    assert_ne!(a, b);
    assert_eq!(manager.connection_count().await, 2);
}

#[tokio::test]
async fn remove_unknown_id_is_noop() {
    let manager = WsManager::new();

    let (_id, _rx) = manager.add().await;
    manager.remove(uuid::Uuid::new_v4()).await;

    assert_eq!(manager.connection_count().await, 1);
}

#[tokio::test]
async fn broadcast_event_reaches_every_observer_as_the_same_frame() {
    let manager = WsManager::new();
    let (_a, mut rx1) = manager.add().await;
    let (_b, mut rx2) = manager.add().await;

    let reached = manager
        .broadcast_event(&RunEvent::module("Login", ModuleStatus::Running, "Starting Login tests"))
        .await;
    assert_eq!(reached, 2);

    for rx in [&mut rx1, &mut rx2] {
        let json = text_json(rx.recv().await.expect("broadcast frame"));
        assert_eq!(json["type"], "MODULE");
        assert_eq!(json["payload"]["module"], "Login");
        assert_eq!(json["payload"]["status"], "running");
    }
}

#[tokio::test]
async fn broadcast_drops_observers_whose_queue_closed() {
    let manager = WsManager::new();
    let (_gone, rx1) = manager.add().await;
    let (_live, mut rx2) = manager.add().await;
    drop(rx1);

    let reached = manager
        .broadcast_event(&RunEvent::log("hello", Severity::Info))
        .await;

    assert_eq!(reached, 1);
    assert_eq!(manager.connection_count().await, 1);
    assert_eq!(text_json(rx2.recv().await.expect("frame"))["payload"]["message"], "hello");
}

#[tokio::test]
async fn send_event_targets_one_observer() {
    let manager = WsManager::new();
    let (target, mut rx1) = manager.add().await;
    let (_other, mut rx2) = manager.add().await;

    assert!(
        manager
            .send_event(target, &RunEvent::log("only you", Severity::Info))
            .await
    );

    assert_eq!(text_json(rx1.recv().await.expect("frame"))["payload"]["message"], "only you");
    assert!(rx2.try_recv().is_err());
}

#[tokio::test]
async fn send_event_to_unknown_observer_is_rejected() {
    let manager = WsManager::new();

    let sent = manager
        .send_event(uuid::Uuid::new_v4(), &RunEvent::log("nobody", Severity::Info))
        .await;

    assert!(!sent);
}

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new();

    let (_a, mut rx1) = manager.add().await;
    let (_b, mut rx2) = manager.add().await;

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);
    assert!(matches!(rx1.recv().await, Some(Message::Close(None))));
    assert!(matches!(rx2.recv().await, Some(Message::Close(None))));
}

#[tokio::test]
async fn ping_all_sends_ping_frames() {
    let manager = WsManager::new();
    let (_id, mut rx) = manager.add().await;

    manager.ping_all().await;

    assert!(matches!(rx.recv().await, Some(Message::Ping(_))));
}

#[tokio::test]
async fn heartbeat_stops_on_shutdown() {
    let manager = std::sync::Arc::new(WsManager::new());
    let shutdown = tokio_util::sync::CancellationToken::new();
    let handle = testdeck_api::ws::start_heartbeat(manager, shutdown.clone());

    shutdown.cancel();

    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("heartbeat exits after shutdown")
        .expect("task joins");
}
