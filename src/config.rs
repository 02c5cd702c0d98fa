use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::ColorTable;
use crate::camera::{Resolution, DEFAULT_WARMUP_FRAMES};
use crate::error::{PipelineError, PipelineResult};
use crate::schedule::parse_schedule;
use crate::session::models::is_valid_plant_id;
use crate::session::PlantMetadata;

pub const CONFIG_ENV: &str = "PLANTWATCH_CONFIG";
pub const DEBUG_ENV: &str = "PLANTWATCH_DEBUG";
pub const DEFAULT_CONFIG_PATH: &str = "plantwatch.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CameraBackendConfig {
    /// External program writing one encoded frame to stdout.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_capture_timeout_secs")]
        timeout_secs: u64,
    },
    Still { path: PathBuf },
}

impl Default for CameraBackendConfig {
    fn default() -> Self {
        CameraBackendConfig::Command {
            program: "fswebcam".into(),
            args: [
                "-q",
                "-d",
                "{device}",
                "-r",
                "{width}x{height}",
                "-S",
                "{warmup}",
                "--no-banner",
                "--jpeg",
                "95",
                "-",
            ]
            .iter()
            .map(|arg| arg.to_string())
            .collect(),
            timeout_secs: default_capture_timeout_secs(),
        }
    }
}

fn default_capture_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraConfig {
    /// Never defaulted: a missing device id is a configuration error.
    #[serde(default)]
    pub device_id: String,
    #[serde(default = "default_resolution")]
    pub resolution: Resolution,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_capture_attempts")]
    pub capture_attempts: u32,
    #[serde(default)]
    pub backend: CameraBackendConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            resolution: default_resolution(),
            warmup_frames: default_warmup_frames(),
            capture_attempts: default_capture_attempts(),
            backend: CameraBackendConfig::default(),
        }
    }
}

fn default_resolution() -> Resolution {
    Resolution::new(1280, 720)
}

fn default_warmup_frames() -> u32 {
    DEFAULT_WARMUP_FRAMES
}

fn default_capture_attempts() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default)]
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            backend: StorageBackend::default(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// Daily trigger times as `HH:MM`, local time.
    #[serde(default = "default_times")]
    pub times: Vec<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub capture_on_start: bool,
    #[serde(default)]
    pub timelapse_interval_minutes: Option<u64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            times: default_times(),
            poll_interval_secs: default_poll_interval_secs(),
            capture_on_start: false,
            timelapse_interval_minutes: None,
        }
    }
}

impl ScheduleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_times() -> Vec<String> {
    vec!["08:00".to_string()]
}

fn default_poll_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub analyzer: ColorTable,
    /// Plants registered on startup if not yet known.
    #[serde(default)]
    pub plants: Vec<PlantMetadata>,
}

impl AppConfig {
    /// Config path from `PLANTWATCH_CONFIG`, else the first CLI argument, else
    /// `plantwatch.json`.
    pub fn resolve_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| std::env::args_os().nth(1).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            PipelineError::config_invalid(format!("cannot read {}: {err}", path.display()))
        })?;
        let mut config = Self::from_json(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(contents: &str) -> PipelineResult<Self> {
        serde_json::from_str(contents)
            .map_err(|err| PipelineError::config_invalid(format!("malformed config: {err}")))
    }

    fn apply_env_overrides(&mut self) {
        let debug_mode = std::env::var(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.schedule.poll_interval_secs = 1;
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let camera = &self.camera;
        if camera.device_id.trim().is_empty() {
            return Err(PipelineError::config_invalid("camera.device_id is required"));
        }
        if camera.resolution.width == 0 || camera.resolution.height == 0 {
            return Err(PipelineError::config_invalid(format!(
                "camera.resolution {} must be positive in both dimensions",
                camera.resolution
            )));
        }
        if camera.capture_attempts == 0 {
            return Err(PipelineError::config_invalid(
                "camera.capture_attempts must be at least 1",
            ));
        }
        match &camera.backend {
            CameraBackendConfig::Command {
                program,
                timeout_secs,
                ..
            } => {
                if program.trim().is_empty() {
                    return Err(PipelineError::config_invalid(
                        "camera.backend.program is required",
                    ));
                }
                if *timeout_secs == 0 {
                    return Err(PipelineError::config_invalid(
                        "camera.backend.timeout_secs must be positive",
                    ));
                }
            }
            CameraBackendConfig::Still { path } => {
                if path.as_os_str().is_empty() {
                    return Err(PipelineError::config_invalid(
                        "camera.backend.path is required",
                    ));
                }
            }
        }

        if self.storage.base_dir.as_os_str().is_empty() {
            return Err(PipelineError::config_invalid("storage.base_dir is required"));
        }

        parse_schedule(&self.schedule.times)?;
        if self.schedule.poll_interval_secs == 0 {
            return Err(PipelineError::config_invalid(
                "schedule.poll_interval_secs must be positive",
            ));
        }
        if self.schedule.timelapse_interval_minutes == Some(0) {
            return Err(PipelineError::config_invalid(
                "schedule.timelapse_interval_minutes must be positive",
            ));
        }

        self.analyzer.validate()?;

        let mut seen = HashSet::new();
        for plant in &self.plants {
            let id = plant.plant_id.as_str();
            if !is_valid_plant_id(id) {
                return Err(PipelineError::config_invalid(format!(
                    "plant id '{id}' must be non-empty and use only [A-Za-z0-9_-]"
                )));
            }
            if !seen.insert(id) {
                return Err(PipelineError::config_invalid(format!(
                    "plant id '{id}' listed twice"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AppConfig {
        AppConfig::from_json(r#"{ "camera": { "device_id": "/dev/video0" } }"#).unwrap()
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let config = minimal();
        config.validate().unwrap();
        assert_eq!(config.camera.resolution, Resolution::new(1280, 720));
        assert_eq!(config.camera.warmup_frames, 5);
        assert_eq!(config.schedule.times, vec!["08:00"]);
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.analyzer, ColorTable::default());
    }

    #[test]
    fn device_id_is_never_defaulted() {
        let config = AppConfig::from_json("{}").unwrap();
        assert!(matches!(
            config.validate(),
            Err(PipelineError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn zero_resolution_is_invalid() {
        let mut config = minimal();
        config.camera.resolution = Resolution::new(0, 720);
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_times_are_invalid() {
        for bad in ["8am", "25:00", "08:60", "08:00:00", ""] {
            let mut config = minimal();
            config.schedule.times = vec![bad.to_string()];
            assert!(
                matches!(config.validate(), Err(PipelineError::ConfigInvalid(_))),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn duplicate_plants_are_invalid() {
        let json = r#"{
            "camera": { "device_id": "0" },
            "plants": [
                { "plant_id": "P1", "species": "basil", "date_planted": "2024-04-01",
                  "growth_stage": "seedling", "expected_harvest_days": 60 },
                { "plant_id": "P1", "species": "mint", "date_planted": "2024-04-02",
                  "growth_stage": "seedling", "expected_harvest_days": 90 }
            ]
        }"#;
        let config = AppConfig::from_json(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn still_backend_parses() {
        let json = r#"{
            "camera": { "device_id": "demo", "backend": { "kind": "still", "path": "demo.jpg" } },
            "storage": { "backend": "sqlite", "base_dir": "/var/lib/plantwatch" }
        }"#;
        let config = AppConfig::from_json(json).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.camera.backend,
            CameraBackendConfig::Still {
                path: PathBuf::from("demo.jpg")
            }
        );
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn load_reports_missing_file_as_invalid_config() {
        let result = AppConfig::load(Path::new("/nonexistent/plantwatch.json"));
        assert!(matches!(result, Err(PipelineError::ConfigInvalid(_))));
    }

    #[test]
    fn malformed_json_is_invalid_config() {
        assert!(matches!(
            AppConfig::from_json("{ not json"),
            Err(PipelineError::ConfigInvalid(_))
        ));
    }
}
