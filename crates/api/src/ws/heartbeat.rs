use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Ping every observer on a fixed interval until `shutdown` fires.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            let count = ws_manager.connection_count().await;
            if count > 0 {
                tracing::trace!(count, "Observer heartbeat");
                ws_manager.ping_all().await;
            }
        }
        tracing::debug!("Heartbeat stopped");
    })
}
