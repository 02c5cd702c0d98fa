use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Local};

use crate::analysis::{ColorHealthAnalyzer, ColorTable};
use crate::camera::{CameraBackend, CameraResource, Frame, Resolution};
use crate::config::CameraConfig;
use crate::error::{PipelineError, PipelineResult, SessionFailure};
use crate::overlay::stamp_timestamp;
use crate::schedule::times::to_second;
use crate::schedule::Clock;
use crate::storage::{ImageCategory, ImageStore, SessionStore};

use super::models::{CaptureSession, PlantMetadata, MAIN_SUBJECT};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Camera parameters a session runs with.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub device_id: String,
    pub resolution: Resolution,
    pub warmup_frames: u32,
    /// Reads attempted per capture target before giving up.
    pub capture_attempts: u32,
}

impl From<&CameraConfig> for CaptureSettings {
    fn from(config: &CameraConfig) -> Self {
        Self {
            device_id: config.device_id.clone(),
            resolution: config.resolution,
            warmup_frames: config.warmup_frames,
            capture_attempts: config.capture_attempts.max(1),
        }
    }
}

/// Wall time spent in each phase of the last successful daily session.
/// Capture excludes the analysis done between reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTimings {
    pub capture: std::time::Duration,
    pub analysis: std::time::Duration,
    pub persist: std::time::Duration,
    pub total: std::time::Duration,
}

/// Runs one capture session end to end: camera, images, analysis, record.
pub struct SessionOrchestrator {
    backend: Box<dyn CameraBackend>,
    images: ImageStore,
    analyzer: ColorHealthAnalyzer,
    store: Box<dyn SessionStore>,
    settings: CaptureSettings,
    clock: Arc<dyn Clock>,
    last_timestamp: Option<DateTime<Local>>,
    last_timings: Option<SessionTimings>,
}

impl SessionOrchestrator {
    pub fn new(
        backend: Box<dyn CameraBackend>,
        images: ImageStore,
        color_table: ColorTable,
        store: Box<dyn SessionStore>,
        settings: CaptureSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            images,
            analyzer: ColorHealthAnalyzer::new(color_table),
            store,
            settings,
            clock,
            last_timestamp: None,
            last_timings: None,
        }
    }

    pub fn analyzer(&self) -> &ColorHealthAnalyzer {
        &self.analyzer
    }

    pub fn last_timings(&self) -> Option<SessionTimings> {
        self.last_timings
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Captures the main frame and one frame per plant, analyzes them, and
    /// persists the session record.
    ///
    /// A failing plant is recorded in `failed_captures` and skipped. Any other
    /// failure aborts the session. The camera is released before this returns
    /// on every path.
    pub fn run_daily_session(
        &mut self,
        plants: &[PlantMetadata],
        environmental_data: Option<BTreeMap<String, serde_json::Value>>,
        notes: Option<String>,
    ) -> Result<CaptureSession, SessionFailure> {
        let session_start = Instant::now();
        let timestamp = self.next_timestamp();
        log_info!(
            "capture session {} starting with {} plant(s)",
            timestamp.format("%Y-%m-%d %H:%M:%S"),
            plants.len()
        );

        let mut camera = CameraResource::acquire(
            self.backend.as_mut(),
            &self.settings.device_id,
            self.settings.resolution,
            self.settings.warmup_frames,
        )?;

        let capture_start = Instant::now();
        let main_frame = self.capture(&mut camera, MAIN_SUBJECT)?;
        let mut stamped = main_frame.clone();
        stamp_timestamp(&mut stamped, &timestamp);
        let image_path = self
            .images
            .derive_path(ImageCategory::Daily, MAIN_SUBJECT, &timestamp);
        self.images.write(&image_path, &stamped)?;

        let mut analysis = std::time::Duration::ZERO;
        let analysis_start = Instant::now();
        let main_composition = self.analyzer.analyze(MAIN_SUBJECT, &main_frame, timestamp);
        analysis += analysis_start.elapsed();

        let mut health_metrics = BTreeMap::new();
        health_metrics.insert(MAIN_SUBJECT.to_string(), main_composition);

        let mut individual_images = BTreeMap::new();
        let mut failed_captures = BTreeMap::new();
        for plant in plants {
            let plant_id = plant.plant_id.as_str();
            match self.capture_individual(&mut camera, plant_id, &timestamp) {
                Ok((path, frame)) => {
                    let analysis_start = Instant::now();
                    let composition = self.analyzer.analyze(plant_id, &frame, timestamp);
                    analysis += analysis_start.elapsed();
                    log_info!(
                        "plant {} captured: {:.1}% plant area, {:.1}% green",
                        plant_id,
                        composition.plant_area_percent,
                        composition.green_percent
                    );
                    health_metrics.insert(plant_id.to_string(), composition);
                    individual_images.insert(plant_id.to_string(), path);
                }
                Err(err) => {
                    log_warn!("plant {} skipped ({}): {err}", plant_id, err.kind());
                    failed_captures.insert(plant_id.to_string(), err.to_string());
                }
            }
        }

        let resolution = camera.resolution();
        // No reads after this point.
        drop(camera);
        let capture = capture_start.elapsed().saturating_sub(analysis);

        let session = CaptureSession {
            timestamp,
            environmental_data,
            image_path,
            plant_metadata: plants.to_vec(),
            individual_images,
            notes,
            health_metrics,
            resolution,
            failed_captures,
        };

        let persist_start = Instant::now();
        if let Err(error) = self.store.save(&session) {
            let record = serde_json::to_string(&session)
                .unwrap_or_else(|err| format!("<unserializable session: {err}>"));
            log_error!(
                "session {} captured but not persisted: {error}; record: {record}",
                session.key()
            );
            return Err(SessionFailure {
                error,
                unsaved: Some(Box::new(session)),
            });
        }

        let timings = SessionTimings {
            capture,
            analysis,
            persist: persist_start.elapsed(),
            total: session_start.elapsed(),
        };
        self.last_timings = Some(timings);

        log_info!(
            "capture session {} complete in {}ms ({} of {} plants, capture: {}ms, analysis: {}ms, persist: {}ms)",
            session.key(),
            timings.total.as_millis(),
            session.individual_images.len(),
            plants.len(),
            timings.capture.as_millis(),
            timings.analysis.as_millis(),
            timings.persist.as_millis()
        );

        Ok(session)
    }

    /// Writes a single un-annotated frame into the timelapse series.
    pub fn capture_timelapse_frame(&mut self) -> PipelineResult<PathBuf> {
        let timestamp = self.next_timestamp();
        let mut camera = CameraResource::acquire(
            self.backend.as_mut(),
            &self.settings.device_id,
            self.settings.resolution,
            self.settings.warmup_frames,
        )?;
        let frame = self.capture(&mut camera, "timelapse")?;
        drop(camera);

        let path = self
            .images
            .derive_path(ImageCategory::Timelapse, MAIN_SUBJECT, &timestamp);
        self.images.write(&path, &frame)?;
        log_info!("timelapse frame written to {}", path.display());
        Ok(path)
    }

    fn capture_individual(
        &self,
        camera: &mut CameraResource,
        plant_id: &str,
        timestamp: &DateTime<Local>,
    ) -> PipelineResult<(PathBuf, Frame)> {
        let frame = self.capture(camera, plant_id)?;
        let path = self
            .images
            .derive_path(ImageCategory::Individual, plant_id, timestamp);
        self.images.write(&path, &frame)?;
        Ok((path, frame))
    }

    fn capture(&self, camera: &mut CameraResource, target: &str) -> PipelineResult<Frame> {
        let attempts = self.settings.capture_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match camera.read_frame() {
                Ok(frame) => return Ok(frame),
                Err(err) => {
                    if attempt < attempts {
                        log_warn!(
                            "capture of {} failed (attempt {}/{}): {err}",
                            target,
                            attempt,
                            attempts
                        );
                    }
                    last_err = Some(err);
                }
            }
        }

        let reason = last_err
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no frame".to_string());
        Err(PipelineError::capture_failed(target, reason))
    }

    /// Second-resolution timestamp, strictly after the previous one.
    fn next_timestamp(&mut self) -> DateTime<Local> {
        let mut timestamp = to_second(self.clock.now());
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                timestamp = last + Duration::seconds(1);
            }
        }
        self.last_timestamp = Some(timestamp);
        timestamp
    }
}
