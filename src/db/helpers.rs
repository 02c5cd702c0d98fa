use anyhow::{Context, Result};
use chrono::{DateTime, Local};

pub fn to_rfc3339(value: &DateTime<Local>) -> String {
    value.to_rfc3339()
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Local))
        .with_context(|| format!("failed to parse {field}"))
}
