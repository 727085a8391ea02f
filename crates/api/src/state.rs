use std::sync::Arc;

use testdeck_core::artifacts::ArtifactStore;
use testdeck_core::catalog::ModuleCatalog;
use testdeck_core::error::CoreError;
use testdeck_core::orchestration::{CommandReportGenerator, OrchestratorConfig, RunOrchestrator};
use testdeck_events::{BusReporter, EventBus};

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Observer fan-out for run events.
    pub event_bus: Arc<EventBus>,
    /// The single test-run coordinator.
    pub orchestrator: RunOrchestrator,
    /// Driver command and default module list.
    pub catalog: Arc<ModuleCatalog>,
    /// Stored artifacts available for a run.
    pub artifacts: Arc<ArtifactStore>,
}

impl AppState {
    /// Wire the orchestrator, bus and stores from configuration.
    ///
    /// Fails if the module command template is unusable.
    pub fn new(config: ServerConfig) -> Result<Self, CoreError> {
        let event_bus = Arc::new(EventBus::default());
        let catalog = ModuleCatalog::new(config.module_command.clone(), config.modules.clone())?;

        let mut reports = CommandReportGenerator::new(
            config.report_command.clone(),
            &config.report_dir,
            &config.report_url,
        )
        .with_timeout(config.report_timeout());

        let mut orchestrator_config = OrchestratorConfig::new(&config.results_dir);
        orchestrator_config.stop_grace = config.stop_grace();
        if let Some(dir) = &config.working_dir {
            orchestrator_config.working_directory = Some(dir.clone());
            reports = reports.with_working_directory(dir);
        }

        let orchestrator = RunOrchestrator::new(
            orchestrator_config,
            Arc::new(BusReporter::new(Arc::clone(&event_bus))),
            Arc::new(reports),
        );

        Ok(Self {
            artifacts: Arc::new(ArtifactStore::new(&config.artifacts_dir)),
            config: Arc::new(config),
            ws_manager: Arc::new(WsManager::new()),
            event_bus,
            orchestrator,
            catalog: Arc::new(catalog),
        })
    }
}
