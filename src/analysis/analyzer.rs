use chrono::{DateTime, Local};

use crate::camera::Frame;

use super::history::{ColorComposition, HealthHistory};
use super::hsv::rgb_to_hsv;
use super::palette::{ColorTable, LeafColor};

/// Segments frames by leaf color and keeps the per-subject history of results.
pub struct ColorHealthAnalyzer {
    table: ColorTable,
    history: HealthHistory,
}

impl ColorHealthAnalyzer {
    pub fn new(table: ColorTable) -> Self {
        Self {
            table,
            history: HealthHistory::new(),
        }
    }

    pub fn table(&self) -> &ColorTable {
        &self.table
    }

    pub fn history(&self) -> &HealthHistory {
        &self.history
    }

    /// Measures `frame` and appends the result to `subject`'s history.
    pub fn analyze(
        &mut self,
        subject: &str,
        frame: &Frame,
        timestamp: DateTime<Local>,
    ) -> ColorComposition {
        let composition = self.measure(frame, timestamp);
        self.history.append(subject, composition.clone());
        composition
    }

    /// Pure measurement without touching history. Frames with no pixels, or
    /// with no plant-colored pixels, yield all zeros.
    pub fn measure(&self, frame: &Frame, timestamp: DateTime<Local>) -> ColorComposition {
        let total = u64::from(frame.width()) * u64::from(frame.height());
        if total == 0 {
            return ColorComposition::empty(timestamp);
        }

        let mut counts = vec![0u64; self.table.ranges().len()];
        let mut union = 0u64;
        for pixel in frame.pixels() {
            let hsv = rgb_to_hsv(pixel);
            let mut matched = false;
            for (count, range) in counts.iter_mut().zip(self.table.ranges()) {
                if range.matches(&hsv) {
                    *count += 1;
                    matched = true;
                }
            }
            if matched {
                union += 1;
            }
        }

        let percent = |count: u64| 100.0 * count as f64 / total as f64;
        let color_percent = |color: LeafColor| {
            self.table
                .ranges()
                .iter()
                .zip(&counts)
                .filter(|(range, _)| range.color == color)
                .map(|(_, count)| percent(*count))
                .sum::<f64>()
        };

        ColorComposition {
            timestamp,
            green_percent: color_percent(LeafColor::Green),
            yellow_percent: color_percent(LeafColor::Yellow),
            brown_percent: color_percent(LeafColor::Brown),
            plant_area_percent: percent(union),
        }
    }

    pub fn trend(&self, subject: &str, window: usize) -> Vec<ColorComposition> {
        self.history.trend(subject, window)
    }
}
