use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use testdeck_api::config::ServerConfig;
use testdeck_api::forwarder::EventForwarder;
use testdeck_api::router::build_app_router;
use testdeck_api::state::AppState;
use testdeck_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "testdeck_api=debug,testdeck_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        artifacts_dir = %config.artifacts_dir.display(),
        results_dir = %config.results_dir.display(),
        modules = config.modules.len(),
        "Loaded server configuration",
    );

    // --- App state (event bus, orchestrator, stores) ---
    let state = AppState::new(config.clone()).expect("Invalid module configuration");
    let ws_manager = Arc::clone(&state.ws_manager);

    // --- Heartbeat ---
    let background_shutdown = CancellationToken::new();
    let heartbeat_handle =
        ws::start_heartbeat(Arc::clone(&ws_manager), background_shutdown.clone());

    // --- Event forwarding (bus -> WebSocket observers) ---
    let forwarder = EventForwarder::new(Arc::clone(&ws_manager));
    let forwarder_handle = tokio::spawn(forwarder.run(state.event_bus.subscribe()));
    tracing::info!("Event forwarder started");

    let orchestrator = state.orchestrator.clone();

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Don't leave a driver process running behind us.
    orchestrator
        .stop_and_drain(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    background_shutdown.cancel();
    if let Err(e) = heartbeat_handle.await {
        tracing::warn!(error = %e, "Heartbeat task did not exit cleanly");
    }
    forwarder_handle.abort();
    tracing::info!("Background tasks stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
