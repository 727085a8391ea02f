//! Domain logic for the test-run orchestrator.
//!
//! Everything here is transport-agnostic: the HTTP surface lives in
//! `testdeck-api` and the observer fan-out in `testdeck-events`.

pub mod artifacts;
pub mod catalog;
pub mod device;
pub mod error;
pub mod module;
pub mod orchestration;
pub mod run;
pub mod status;
pub mod types;
