//! Integration tests for driver loopback endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{body_json, build_test_app, post_json};
use testdeck_core::status::{ModuleStatus, Severity};
use testdeck_events::RunEvent;

#[tokio::test]
async fn log_step_is_republished() {
    let app = build_test_app();
    let mut rx = app.state.event_bus.subscribe();

    let response = post_json(
        &app,
        "/api/v1/log-step",
        json!({ "message": "Tapped login button", "status": "SUCCESS" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "ok");

    assert_eq!(
        rx.recv().await.expect("event"),
        RunEvent::log("Tapped login button", Severity::Success)
    );
}

#[tokio::test]
async fn log_step_status_defaults_to_info() {
    let app = build_test_app();
    let mut rx = app.state.event_bus.subscribe();

    post_json(&app, "/api/v1/log-step", json!({ "message": "plain" })).await;

    assert_eq!(
        rx.recv().await.expect("event"),
        RunEvent::log("plain", Severity::Info)
    );
}

#[tokio::test]
async fn module_status_is_republished() {
    let app = build_test_app();
    let mut rx = app.state.event_bus.subscribe();

    let response = post_json(
        &app,
        "/api/v1/module-status",
        json!({ "module": "Login", "status": "completed" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        rx.recv().await.expect("event"),
        RunEvent::module("Login", ModuleStatus::Completed, "")
    );
}

#[tokio::test]
async fn unknown_module_status_is_rejected() {
    let app = build_test_app();

    let response = post_json(
        &app,
        "/api/v1/module-status",
        json!({ "module": "Login", "status": "exploded" }),
    )
    .await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn metric_payload_is_forwarded_verbatim() {
    let app = build_test_app();
    let mut rx = app.state.event_bus.subscribe();

    post_json(&app, "/api/v1/metric", json!({ "cpu": 41.5, "mem_mb": 512 })).await;

    assert_eq!(
        rx.recv().await.expect("event"),
        RunEvent::Metric(json!({ "cpu": 41.5, "mem_mb": 512 }))
    );
}

#[tokio::test]
async fn run_complete_announces_the_report() {
    let app = build_test_app();
    let mut rx = app.state.event_bus.subscribe();

    let response = post_json(
        &app,
        "/api/v1/run-complete",
        json!({ "report_url": "http://localhost:8000/reports/index.html" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "ok");

    let event = rx.recv().await.expect("event");
    assert_eq!(
        event,
        RunEvent::RunComplete {
            report_url: "http://localhost:8000/reports/index.html".to_string()
        }
    );
    let wire = serde_json::to_value(&event).expect("serialize");
    assert_eq!(wire["type"], "RUN_COMPLETE");
}

#[tokio::test]
async fn run_complete_requires_a_report_url() {
    let app = build_test_app();

    let response = post_json(&app, "/api/v1/run-complete", json!({})).await;
    assert!(response.status().is_client_error());
}
