use anyhow::{bail, Context, Result};
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{helpers::to_rfc3339, Database};
use crate::error::{PipelineError, PipelineResult};
use crate::session::CaptureSession;
use crate::storage::SessionStore;

pub(super) fn insert_session_tx(conn: &mut Connection, record: &CaptureSession) -> Result<()> {
    let key = record.key();
    let record_json =
        serde_json::to_string(record).context("failed to serialize capture session")?;

    let tx = conn.transaction()?;

    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM capture_sessions WHERE session_key = ?1)",
        params![key],
        |row| row.get(0),
    )?;
    if exists {
        bail!("a session with key {key} already exists");
    }

    tx.execute(
        "INSERT INTO capture_sessions (session_key, captured_at, image_path, plant_count, captured_count, record_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            key,
            to_rfc3339(&record.timestamp),
            record.image_path.display().to_string(),
            record.plant_metadata.len() as i64,
            record.individual_images.len() as i64,
            record_json,
            to_rfc3339(&Local::now()),
        ],
    )?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO health_readings (session_key, subject, captured_at, green_percent, yellow_percent, brown_percent, plant_area_percent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for (subject, reading) in &record.health_metrics {
            stmt.execute(params![
                key,
                subject,
                to_rfc3339(&reading.timestamp),
                reading.green_percent,
                reading.yellow_percent,
                reading.brown_percent,
                reading.plant_area_percent,
            ])?;
        }
    }

    tx.commit()?;
    Ok(())
}

fn select_session(conn: &Connection, key: &str) -> Result<Option<CaptureSession>> {
    let record_json: Option<String> = conn
        .query_row(
            "SELECT record_json FROM capture_sessions WHERE session_key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;

    record_json
        .map(|json| {
            serde_json::from_str(&json)
                .with_context(|| format!("corrupt capture session record {key}"))
        })
        .transpose()
}

fn select_keys(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT session_key FROM capture_sessions ORDER BY session_key ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut keys = Vec::new();
    for key in rows {
        keys.push(key?);
    }
    Ok(keys)
}

impl Database {
    pub async fn get_capture_session(&self, key: &str) -> Result<Option<CaptureSession>> {
        let key = key.to_string();
        self.execute(move |conn| select_session(conn, &key)).await
    }

    pub async fn list_session_keys(&self) -> Result<Vec<String>> {
        self.execute(|conn| select_keys(conn)).await
    }

    fn persistence_target(&self) -> String {
        self.path().display().to_string()
    }
}

impl SessionStore for Database {
    fn save(&mut self, session: &CaptureSession) -> PipelineResult<()> {
        let record = session.clone();
        self.execute_blocking(move |conn| insert_session_tx(conn, &record))
            .map_err(|err| {
                PipelineError::persistence_failed(self.persistence_target(), format!("{err:#}"))
            })
    }

    fn load(&self, key: &str) -> PipelineResult<Option<CaptureSession>> {
        let key = key.to_string();
        self.execute_blocking(move |conn| select_session(conn, &key))
            .map_err(|err| {
                PipelineError::persistence_failed(self.persistence_target(), format!("{err:#}"))
            })
    }

    fn list_keys(&self) -> PipelineResult<Vec<String>> {
        self.execute_blocking(|conn| select_keys(conn)).map_err(|err| {
            PipelineError::persistence_failed(self.persistence_target(), format!("{err:#}"))
        })
    }
}
