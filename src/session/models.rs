use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;

use chrono::{DateTime, Local, LocalResult, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::analysis::ColorComposition;
use crate::camera::Resolution;

/// Subject key used for the whole-scene frame in `health_metrics` and history.
pub const MAIN_SUBJECT: &str = "main";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Seedling,
    Vegetative,
    Flowering,
    Fruiting,
    Mature,
}

impl GrowthStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthStage::Seedling => "seedling",
            GrowthStage::Vegetative => "vegetative",
            GrowthStage::Flowering => "flowering",
            GrowthStage::Fruiting => "fruiting",
            GrowthStage::Mature => "mature",
        }
    }
}

/// Descriptive record of one plant. Supplied by the caller, never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlantMetadata {
    pub plant_id: String,
    pub species: String,
    pub date_planted: NaiveDate,
    pub growth_stage: GrowthStage,
    pub expected_harvest_days: u32,
}

/// The persisted record of one orchestration run, keyed by `timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureSession {
    pub timestamp: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environmental_data: Option<BTreeMap<String, serde_json::Value>>,
    pub image_path: PathBuf,
    #[serde(default)]
    pub plant_metadata: Vec<PlantMetadata>,
    #[serde(default)]
    pub individual_images: BTreeMap<String, PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub health_metrics: BTreeMap<String, ColorComposition>,
    pub resolution: Resolution,
    /// Plants whose individual capture or write failed, with the reason.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_captures: BTreeMap<String, String>,
}

impl CaptureSession {
    /// Storage key for this session: the timestamp at second resolution.
    pub fn key(&self) -> String {
        session_key(&self.timestamp)
    }

    pub fn plant_ids(&self) -> impl Iterator<Item = &str> {
        self.plant_metadata.iter().map(|plant| plant.plant_id.as_str())
    }
}

/// Plant ids name files on disk, so they are limited to `[A-Za-z0-9_-]`.
pub fn is_valid_plant_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn session_key(timestamp: &DateTime<Local>) -> String {
    timestamp_stem(timestamp)
}

/// `YYYYmmdd_HHMMSS` in wall-clock time, shared by session keys and image
/// file names. A wall-clock time that occurs twice (the repeated hour when
/// DST ends) also carries its UTC offset, so distinct instants never share
/// a name.
pub fn timestamp_stem<Tz>(timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let stem = timestamp.format("%Y%m%d_%H%M%S").to_string();
    match timestamp
        .timezone()
        .offset_from_local_datetime(&timestamp.naive_local())
    {
        LocalResult::Ambiguous(..) => format!("{stem}{}", timestamp.format("%z")),
        _ => stem,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::{Duration, FixedOffset, NaiveDateTime, NaiveTime};

    pub fn plant(id: &str) -> PlantMetadata {
        PlantMetadata {
            plant_id: id.to_string(),
            species: "basil".to_string(),
            date_planted: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            growth_stage: GrowthStage::Vegetative,
            expected_harvest_days: 60,
        }
    }

    pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    /// US Eastern around the 2024 fall-back: UTC-4 until 2024-11-03 06:00 UTC,
    /// UTC-5 after, so local 01:00-01:59 that day happens twice.
    #[derive(Debug, Clone, Copy)]
    pub struct FallBackZone;

    impl FallBackZone {
        fn daylight() -> FixedOffset {
            FixedOffset::west_opt(4 * 3600).unwrap()
        }

        fn standard() -> FixedOffset {
            FixedOffset::west_opt(5 * 3600).unwrap()
        }

        fn switch_utc() -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, 11, 3)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap()
        }
    }

    impl TimeZone for FallBackZone {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            FallBackZone
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let switch = Self::switch_utc();
            let as_daylight = *local + Duration::hours(4) < switch;
            let as_standard = *local + Duration::hours(5) >= switch;
            match (as_daylight, as_standard) {
                (true, true) => LocalResult::Ambiguous(Self::daylight(), Self::standard()),
                (true, false) => LocalResult::Single(Self::daylight()),
                (false, true) => LocalResult::Single(Self::standard()),
                (false, false) => LocalResult::None,
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc < Self::switch_utc() {
                Self::daylight()
            } else {
                Self::standard()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{at, plant, FallBackZone};
    use super::*;

    #[test]
    fn session_key_uses_second_resolution() {
        assert_eq!(session_key(&at(2024, 5, 1, 8, 0, 7)), "20240501_080007");
    }

    #[test]
    fn plant_ids_are_restricted_to_file_safe_characters() {
        assert!(is_valid_plant_id("basil-01_a"));
        assert!(!is_valid_plant_id(""));
        assert!(!is_valid_plant_id("../x"));
        assert!(!is_valid_plant_id("a b"));
    }

    #[test]
    fn repeated_wall_clock_hour_keeps_distinct_stems() {
        let repeated = FallBackZone.with_ymd_and_hms(2024, 11, 3, 1, 30, 0);
        let first = repeated.earliest().unwrap();
        let second = repeated.latest().unwrap();
        assert_ne!(first, second);

        assert_eq!(timestamp_stem(&first), "20241103_013000-0400");
        assert_eq!(timestamp_stem(&second), "20241103_013000-0500");

        let before = FallBackZone.with_ymd_and_hms(2024, 11, 3, 0, 30, 0).unwrap();
        let after = FallBackZone.with_ymd_and_hms(2024, 11, 3, 2, 30, 0).unwrap();
        assert_eq!(timestamp_stem(&before), "20241103_003000");
        assert_eq!(timestamp_stem(&after), "20241103_023000");
    }

    #[test]
    fn fresh_sessions_do_not_share_containers() {
        let make = || CaptureSession {
            timestamp: at(2024, 5, 1, 8, 0, 0),
            environmental_data: None,
            image_path: PathBuf::from("main.jpg"),
            plant_metadata: Vec::new(),
            individual_images: BTreeMap::new(),
            notes: None,
            health_metrics: BTreeMap::new(),
            resolution: Resolution::new(640, 480),
            failed_captures: BTreeMap::new(),
        };
        let mut first = make();
        let second = make();
        first.individual_images.insert("P1".into(), PathBuf::from("p1.jpg"));
        assert!(second.individual_images.is_empty());
    }

    #[test]
    fn record_round_trips_through_json_without_empty_failures() {
        let session = CaptureSession {
            timestamp: at(2024, 5, 1, 8, 0, 0),
            environmental_data: Some(BTreeMap::from([(
                "temperature_c".to_string(),
                serde_json::json!(21.5),
            )])),
            image_path: PathBuf::from("data/images/daily/main.jpg"),
            plant_metadata: vec![plant("P1")],
            individual_images: BTreeMap::from([("P1".to_string(), PathBuf::from("p1.jpg"))]),
            notes: Some("watered".into()),
            health_metrics: BTreeMap::new(),
            resolution: Resolution::new(1280, 720),
            failed_captures: BTreeMap::new(),
        };

        let json = serde_json::to_string(&session).unwrap();
        assert!(!json.contains("failed_captures"));
        assert!(json.contains("\"growth_stage\":\"vegetative\""));

        let back: CaptureSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}
