use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Leaf-color composition of one frame. Every field is a percentage of all
/// pixels in the frame, and the three colors never exceed `plant_area_percent`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColorComposition {
    pub timestamp: DateTime<Local>,
    pub green_percent: f64,
    pub yellow_percent: f64,
    pub brown_percent: f64,
    pub plant_area_percent: f64,
}

impl ColorComposition {
    pub fn empty(timestamp: DateTime<Local>) -> Self {
        Self {
            timestamp,
            green_percent: 0.0,
            yellow_percent: 0.0,
            brown_percent: 0.0,
            plant_area_percent: 0.0,
        }
    }
}

/// Append-only per-subject series, kept in ascending timestamp order.
#[derive(Debug, Default)]
pub struct HealthHistory {
    series: BTreeMap<String, Vec<ColorComposition>>,
}

impl HealthHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, subject: &str, composition: ColorComposition) {
        let entries = self.series.entry(subject.to_string()).or_default();
        // Late arrivals are slotted in after any entry with the same timestamp.
        let at = entries.partition_point(|entry| entry.timestamp <= composition.timestamp);
        entries.insert(at, composition);
    }

    /// The most recent `window` entries, oldest first.
    pub fn trend(&self, subject: &str, window: usize) -> Vec<ColorComposition> {
        self.series
            .get(subject)
            .map(|entries| entries[entries.len().saturating_sub(window)..].to_vec())
            .unwrap_or_default()
    }

    pub fn latest(&self, subject: &str) -> Option<&ColorComposition> {
        self.series.get(subject).and_then(|entries| entries.last())
    }

    pub fn len(&self, subject: &str) -> usize {
        self.series.get(subject).map_or(0, Vec::len)
    }

    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}
