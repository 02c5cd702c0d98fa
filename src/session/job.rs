use chrono::NaiveDateTime;

use crate::error::{PipelineError, PipelineResult, SessionFailure};
use crate::schedule::ScheduledJob;
use crate::storage::PlantRegistry;

use super::orchestrator::SessionOrchestrator;

/// Daily capture fired by the schedule driver. Participating plants are read
/// from the registry at trigger time, so plants registered between runs are
/// picked up without a restart.
pub struct DailyCaptureJob {
    orchestrator: SessionOrchestrator,
    registry: PlantRegistry,
}

impl DailyCaptureJob {
    pub fn new(orchestrator: SessionOrchestrator, registry: PlantRegistry) -> Self {
        Self {
            orchestrator,
            registry,
        }
    }

    pub fn orchestrator(&self) -> &SessionOrchestrator {
        &self.orchestrator
    }
}

impl ScheduledJob for DailyCaptureJob {
    fn run_session(&mut self, due: NaiveDateTime) -> Result<(), SessionFailure> {
        let plants = self.registry.plants().map_err(|err| {
            PipelineError::persistence_failed("plant registry", format!("{err:#}"))
        })?;

        let notes = format!("scheduled capture for {}", due.format("%Y-%m-%d %H:%M"));
        self.orchestrator
            .run_daily_session(&plants, None, Some(notes))
            .map(|_| ())
    }

    fn capture_timelapse(&mut self) -> PipelineResult<()> {
        self.orchestrator.capture_timelapse_frame().map(|_| ())
    }
}
