#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use testdeck_api::config::ServerConfig;
use testdeck_api::router::build_app_router;
use testdeck_api::state::AppState;
use testdeck_core::catalog::ModuleSelection;

/// A router wired to a scratch directory, plus handles for assertions.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub tmp: tempfile::TempDir,
}

/// Build a test `ServerConfig` rooted at `root`.
///
/// Modules are shell scripts under `root/tests`, run as `sh {script}`; the
/// report command is `true` so report generation always succeeds.
pub fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        artifacts_dir: root.join("artifacts"),
        results_dir: root.join("results"),
        report_dir: root.join("report"),
        working_dir: Some(root.to_path_buf()),
        module_command: vec!["sh".to_string(), "{script}".to_string()],
        modules: vec![
            ModuleSelection::new("Login", "tests/login.sh"),
            ModuleSelection::new("Onboarding", "tests/onboarding.sh"),
        ],
        report_command: vec!["true".to_string()],
        report_url: "http://localhost:8000/reports/index.html".to_string(),
        report_timeout_secs: 10,
        stop_grace_secs: 2,
        adb_command: "/nonexistent/adb".to_string(),
    }
}

/// Build the full application router over a fresh scratch directory with
/// one stored artifact (`app.apk`) and passing default module scripts.
pub fn build_test_app() -> TestApp {
    let tmp = tempfile::tempdir().expect("temp dir");
    std::fs::create_dir_all(tmp.path().join("artifacts")).expect("artifacts dir");
    std::fs::write(tmp.path().join("artifacts/app.apk"), b"apk").expect("artifact");
    write_script(tmp.path(), "tests/login.sh", "echo login ok\n");
    write_script(tmp.path(), "tests/onboarding.sh", "echo onboarding ok\n");

    let config = test_config(tmp.path());
    let state = AppState::new(config.clone()).expect("valid state");
    let router = build_app_router(state.clone(), &config);

    TestApp { router, state, tmp }
}

pub fn write_script(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("script dir");
    }
    std::fs::write(path, body).expect("write script");
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    app.router.clone().oneshot(request).await.expect("response")
}

pub async fn post_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    app.router.clone().oneshot(request).await.expect("response")
}

pub async fn post_empty(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    app.router.clone().oneshot(request).await.expect("response")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

/// Poll until no run is active, failing after `limit`.
pub async fn wait_for_idle(app: &TestApp, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    while app.state.orchestrator.is_running() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "run still active after {limit:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until a module process is running, failing after `limit`.
pub async fn wait_for_process(app: &TestApp, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    while app.state.orchestrator.state().active_process().is_none() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "no module process after {limit:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
