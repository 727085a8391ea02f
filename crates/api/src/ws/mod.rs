//! WebSocket surface for run observers.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::{ws_handler, RUN_IN_PROGRESS_NOTICE};
pub use heartbeat::start_heartbeat;
pub use manager::{ObserverId, WsManager};
