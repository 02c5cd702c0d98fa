use anyhow::Result;
use rusqlite::{params, Row};
use serde::Serialize;

use crate::analysis::ColorComposition;
use crate::db::{helpers::parse_datetime, Database};

/// One subject's composition from one stored session.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReading {
    pub session_key: String,
    pub subject: String,
    pub composition: ColorComposition,
}

fn row_to_reading(row: &Row) -> Result<HealthReading> {
    let captured_at: String = row.get("captured_at")?;
    Ok(HealthReading {
        session_key: row.get("session_key")?,
        subject: row.get("subject")?,
        composition: ColorComposition {
            timestamp: parse_datetime(&captured_at, "captured_at")?,
            green_percent: row.get("green_percent")?,
            yellow_percent: row.get("yellow_percent")?,
            brown_percent: row.get("brown_percent")?,
            plant_area_percent: row.get("plant_area_percent")?,
        },
    })
}

impl Database {
    /// Most recent `limit` readings for `subject`, oldest first.
    pub async fn health_readings_for_subject(
        &self,
        subject: &str,
        limit: usize,
    ) -> Result<Vec<HealthReading>> {
        let subject = subject.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_key, subject, captured_at, green_percent, yellow_percent, brown_percent, plant_area_percent
                 FROM (
                     SELECT * FROM health_readings
                     WHERE subject = ?1
                     ORDER BY captured_at DESC
                     LIMIT ?2
                 )
                 ORDER BY captured_at ASC",
            )?;
            let mut rows = stmt.query(params![subject, limit])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(row_to_reading(row)?);
            }
            Ok(readings)
        })
        .await
    }
}
