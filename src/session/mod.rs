pub mod job;
pub mod models;
pub mod orchestrator;

pub use job::DailyCaptureJob;
pub use models::{CaptureSession, GrowthStage, PlantMetadata, MAIN_SUBJECT};
pub use orchestrator::{CaptureSettings, SessionOrchestrator, SessionTimings};
