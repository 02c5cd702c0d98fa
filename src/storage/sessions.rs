use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};
use crate::session::CaptureSession;

use super::images::temp_sibling;

/// Key-addressable store for capture session records, keyed by
/// `CaptureSession::key()`.
pub trait SessionStore: Send {
    /// Persists a new record. An existing record under the same key is never
    /// overwritten.
    fn save(&mut self, session: &CaptureSession) -> PipelineResult<()>;

    fn load(&self, key: &str) -> PipelineResult<Option<CaptureSession>>;

    /// All stored keys in ascending (chronological) order.
    fn list_keys(&self) -> PipelineResult<Vec<String>>;
}

/// One pretty-printed JSON document per session under `metadata/sessions`.
#[derive(Debug, Clone)]
pub struct JsonSessionStore {
    dir: PathBuf,
}

impl JsonSessionStore {
    pub fn open(base_dir: &Path) -> PipelineResult<Self> {
        let dir = base_dir.join("metadata").join("sessions");
        fs::create_dir_all(&dir).map_err(|err| {
            PipelineError::config_invalid(format!(
                "cannot create session directory {}: {err}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SessionStore for JsonSessionStore {
    fn save(&mut self, session: &CaptureSession) -> PipelineResult<()> {
        let path = self.path_for(&session.key());
        let target = path.display().to_string();

        let serialized = serde_json::to_vec_pretty(session)
            .map_err(|err| PipelineError::persistence_failed(&target, err))?;

        let tmp_path = temp_sibling(&path);
        let write_tmp = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&serialized)?;
            file.sync_all()
        };
        write_tmp().map_err(|err| {
            let _ = fs::remove_file(&tmp_path);
            PipelineError::persistence_failed(&target, err)
        })?;

        // hard_link fails if the destination exists, which keeps keys write-once.
        let linked = fs::hard_link(&tmp_path, &path);
        let _ = fs::remove_file(&tmp_path);
        linked.map_err(|err| {
            if err.kind() == std::io::ErrorKind::AlreadyExists {
                PipelineError::persistence_failed(&target, "a session with this timestamp already exists")
            } else {
                PipelineError::persistence_failed(&target, err)
            }
        })
    }

    fn load(&self, key: &str) -> PipelineResult<Option<CaptureSession>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read(&path)
            .map_err(|err| PipelineError::persistence_failed(path.display().to_string(), err))?;
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|err| PipelineError::persistence_failed(path.display().to_string(), err))
    }

    fn list_keys(&self) -> PipelineResult<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|err| PipelineError::persistence_failed(self.dir.display().to_string(), err))?;

        let mut keys: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    return None;
                }
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}
