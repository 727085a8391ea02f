//! [`StatusReporter`] implementation that publishes onto the [`EventBus`].

use std::sync::Arc;

use testdeck_core::status::{ModuleStatus, Severity, StatusReporter};

use crate::bus::{EventBus, RunEvent};

/// Forwards orchestrator status onto the bus. Never fails.
#[derive(Clone)]
pub struct BusReporter {
    bus: Arc<EventBus>,
}

impl BusReporter {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl StatusReporter for BusReporter {
    fn publish_log(&self, line: &str, severity: Severity) {
        self.bus.publish(RunEvent::log(line, severity));
    }

    fn publish_module_status(&self, module: &str, status: ModuleStatus, message: &str) {
        self.bus.publish(RunEvent::module(module, status, message));
    }

    fn publish_run_complete(&self, report_location: &str) {
        self.bus.publish(RunEvent::RunComplete {
            report_url: report_location.to_string(),
        });
    }
}
