use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

use super::hsv::Hsv;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LeafColor {
    Green,
    Yellow,
    Brown,
}

impl LeafColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeafColor::Green => "green",
            LeafColor::Yellow => "yellow",
            LeafColor::Brown => "brown",
        }
    }
}

/// Half-open hue interval `[hue_min, hue_max)` in degrees, gated by minimum
/// saturation and value so near-black and near-white pixels never match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColorRange {
    pub color: LeafColor,
    pub hue_min: f32,
    pub hue_max: f32,
    pub saturation_min: u8,
    pub value_min: u8,
}

impl ColorRange {
    pub fn new(color: LeafColor, hue_min: f32, hue_max: f32) -> Self {
        Self {
            color,
            hue_min,
            hue_max,
            saturation_min: 40,
            value_min: 40,
        }
    }

    pub fn matches(&self, hsv: &Hsv) -> bool {
        hsv.hue >= self.hue_min
            && hsv.hue < self.hue_max
            && hsv.saturation >= self.saturation_min
            && hsv.value >= self.value_min
    }
}

/// Ordered, non-overlapping table of leaf colors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ColorTable {
    ranges: Vec<ColorRange>,
}

impl Default for ColorTable {
    fn default() -> Self {
        Self {
            ranges: vec![
                ColorRange::new(LeafColor::Green, 70.0, 170.0),
                ColorRange::new(LeafColor::Yellow, 40.0, 70.0),
                ColorRange::new(LeafColor::Brown, 0.0, 40.0),
            ],
        }
    }
}

impl ColorTable {
    pub fn new(ranges: Vec<ColorRange>) -> PipelineResult<Self> {
        let table = Self { ranges };
        table.validate()?;
        Ok(table)
    }

    pub fn ranges(&self) -> &[ColorRange] {
        &self.ranges
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.ranges.is_empty() {
            return Err(PipelineError::config_invalid("color table is empty"));
        }

        for (i, range) in self.ranges.iter().enumerate() {
            if !(0.0..=360.0).contains(&range.hue_min)
                || !(0.0..=360.0).contains(&range.hue_max)
                || range.hue_min >= range.hue_max
            {
                return Err(PipelineError::config_invalid(format!(
                    "{} hue range [{}, {}) must satisfy 0 <= min < max <= 360",
                    range.color.as_str(),
                    range.hue_min,
                    range.hue_max
                )));
            }

            for other in &self.ranges[i + 1..] {
                if other.color == range.color {
                    return Err(PipelineError::config_invalid(format!(
                        "color {} listed twice",
                        range.color.as_str()
                    )));
                }
                if range.hue_min < other.hue_max && other.hue_min < range.hue_max {
                    return Err(PipelineError::config_invalid(format!(
                        "hue ranges for {} and {} overlap",
                        range.color.as_str(),
                        other.color.as_str()
                    )));
                }
            }
        }

        Ok(())
    }

    /// First range matching the pixel, if any.
    pub fn classify(&self, hsv: &Hsv) -> Option<usize> {
        self.ranges.iter().position(|range| range.matches(hsv))
    }
}
