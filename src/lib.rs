pub mod analysis;
pub mod camera;
pub mod config;
pub mod db;
pub mod error;
pub mod overlay;
pub mod schedule;
pub mod session;
pub mod storage;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use camera::{CameraBackend, CommandBackend, StillImageBackend};
use config::{AppConfig, CameraBackendConfig, CameraConfig, StorageBackend, StorageConfig};
use db::Database;
use schedule::{DriverHandle, ScheduleDriver, SystemClock};
use session::{CaptureSettings, DailyCaptureJob, SessionOrchestrator, MAIN_SUBJECT};
use storage::{ImageStore, JsonSessionStore, PlantRegistry, SessionStore};

const DATABASE_FILE: &str = "plantwatch.sqlite3";

fn build_backend(camera: &CameraConfig) -> Box<dyn CameraBackend> {
    match &camera.backend {
        CameraBackendConfig::Command {
            program,
            args,
            timeout_secs,
        } => Box::new(
            CommandBackend::new(
                program.clone(),
                args.clone(),
                Duration::from_secs(*timeout_secs),
            )
            .with_warmup(camera.warmup_frames),
        ),
        CameraBackendConfig::Still { path } => Box::new(StillImageBackend::new(path.clone())),
    }
}

async fn build_store(storage: &StorageConfig) -> Result<Box<dyn SessionStore>> {
    match storage.backend {
        StorageBackend::Json => {
            let store = JsonSessionStore::open(&storage.base_dir)?;
            Ok(Box::new(store))
        }
        StorageBackend::Sqlite => {
            let path = storage.base_dir.join("metadata").join(DATABASE_FILE);
            let db = Database::new(path).context("failed to open session database")?;

            let keys = db.list_session_keys().await?;
            if let Some(last_key) = keys.last() {
                if let Some(last) = db.get_capture_session(last_key).await? {
                    info!(
                        "{} stored sessions, last {} captured {} of {} plants",
                        keys.len(),
                        last_key,
                        last.individual_images.len(),
                        last.plant_metadata.len()
                    );
                }
            }

            let recent = db.health_readings_for_subject(MAIN_SUBJECT, 7).await?;
            if let Some(last) = recent.last() {
                info!(
                    "last stored reading {}: green {:.1}% over {} sessions",
                    last.session_key,
                    last.composition.green_percent,
                    recent.len()
                );
            }
            Ok(Box::new(db))
        }
    }
}

fn seed_registry(config: &AppConfig) -> Result<PlantRegistry> {
    let mut registry = PlantRegistry::open(&config.storage.base_dir)?;
    for plant in &config.plants {
        if registry.contains(&plant.plant_id) {
            continue;
        }
        registry
            .register(plant)
            .with_context(|| format!("failed to register plant {}", plant.plant_id))?;
        info!("registered plant {} ({})", plant.plant_id, plant.species);
    }
    Ok(registry)
}

async fn run_async(config: AppConfig) -> Result<()> {
    let images = ImageStore::new(&config.storage.base_dir);
    images.ensure_directories()?;

    let store = build_store(&config.storage).await?;
    let registry = seed_registry(&config)?;

    let orchestrator = SessionOrchestrator::new(
        build_backend(&config.camera),
        images,
        config.analyzer.clone(),
        store,
        CaptureSettings::from(&config.camera),
        Arc::new(SystemClock),
    );
    let job = DailyCaptureJob::new(orchestrator, registry);
    let driver = ScheduleDriver::new(&config.schedule, job)?;

    let mut handle = DriverHandle::spawn(driver);
    info!(
        "plantwatch running: camera {} at {}, schedule {:?}",
        config.camera.device_id, config.camera.resolution, config.schedule.times
    );

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
    }

    info!("shutting down, waiting for any session in progress");
    let stats = handle.stop().await?;
    info!(
        "stopped after {} sessions ({} failed, {} triggers skipped, {} timelapse frames)",
        stats.sessions_run, stats.sessions_failed, stats.triggers_skipped, stats.timelapse_frames
    );
    Ok(())
}

pub fn run() -> Result<()> {
    utils::logging::init_logging();

    let config_path = AppConfig::resolve_path();
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("plantwatch")
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(run_async(config))
}
