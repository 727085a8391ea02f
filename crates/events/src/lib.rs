//! Testdeck observer fan-out.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`RunEvent`]: the wire envelope observers receive.
//! - [`BusReporter`]: the orchestrator's `StatusReporter`, publishing onto
//!   the bus.

pub mod bus;
pub mod reporter;

pub use bus::{EventBus, RunEvent};
pub use reporter::BusReporter;
