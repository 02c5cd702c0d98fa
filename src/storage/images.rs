use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};

use crate::camera::Frame;
use crate::error::{PipelineError, PipelineResult};
use crate::session::models::timestamp_stem;

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ImageCategory {
    /// Whole-scene frame of a daily session.
    Daily,
    Individual,
    Timelapse,
}

impl ImageCategory {
    pub const ALL: [ImageCategory; 3] = [
        ImageCategory::Daily,
        ImageCategory::Individual,
        ImageCategory::Timelapse,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            ImageCategory::Daily => "daily",
            ImageCategory::Individual => "individual",
            ImageCategory::Timelapse => "timelapse",
        }
    }
}

/// Owns the on-disk image taxonomy under `base_dir/images`.
#[derive(Debug, Clone)]
pub struct ImageStore {
    base_dir: PathBuf,
}

impl ImageStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn images_dir(&self) -> PathBuf {
        self.base_dir.join("images")
    }

    /// Creates `images/{daily,individual,timelapse}`. Safe to call repeatedly.
    pub fn ensure_directories(&self) -> PipelineResult<()> {
        if self.base_dir.exists() && !self.base_dir.is_dir() {
            return Err(PipelineError::config_invalid(format!(
                "base directory {} is not a directory",
                self.base_dir.display()
            )));
        }

        for category in ImageCategory::ALL {
            let dir = self.images_dir().join(category.dir_name());
            fs::create_dir_all(&dir).map_err(|err| {
                PipelineError::config_invalid(format!(
                    "cannot create image directory {}: {err}",
                    dir.display()
                ))
            })?;
        }

        let probe = self.images_dir().join(".write_probe");
        fs::write(&probe, b"ok")
            .and_then(|_| fs::remove_file(&probe))
            .map_err(|err| {
                PipelineError::config_invalid(format!(
                    "image directory {} is not writable: {err}",
                    self.images_dir().display()
                ))
            })?;

        Ok(())
    }

    /// Pure function of its inputs: the same triple always maps to the same path,
    /// and distinct instants never share one.
    pub fn derive_path<Tz>(
        &self,
        category: ImageCategory,
        subject_id: &str,
        timestamp: &DateTime<Tz>,
    ) -> PathBuf
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let file_name = format!(
            "{}_{}.jpg",
            sanitize_subject(subject_id),
            timestamp_stem(timestamp)
        );
        self.images_dir().join(category.dir_name()).join(file_name)
    }

    /// Path of a previously written image, if it is on disk.
    pub fn lookup(
        &self,
        category: ImageCategory,
        subject_id: &str,
        timestamp: &DateTime<Local>,
    ) -> Option<PathBuf> {
        let path = self.derive_path(category, subject_id, timestamp);
        path.is_file().then_some(path)
    }

    /// Encodes `frame` as JPEG and writes it to `path` via a temporary sibling.
    /// Returns the number of bytes on disk.
    pub fn write(&self, path: &Path, frame: &Frame) -> PipelineResult<u64> {
        let target = path.display().to_string();

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
            .encode_image(frame)
            .map_err(|err| PipelineError::persistence_failed(&target, err))?;
        if encoded.is_empty() {
            return Err(PipelineError::persistence_failed(
                &target,
                "encoder produced no data",
            ));
        }

        let tmp_path = temp_sibling(path);
        fs::write(&tmp_path, &encoded)
            .and_then(|_| fs::rename(&tmp_path, path))
            .map_err(|err| {
                let _ = fs::remove_file(&tmp_path);
                PipelineError::persistence_failed(&target, err)
            })?;

        let written = fs::metadata(path)
            .map_err(|err| PipelineError::persistence_failed(&target, err))?
            .len();
        if written != encoded.len() as u64 {
            return Err(PipelineError::persistence_failed(
                &target,
                format!("wrote {written} of {} bytes", encoded.len()),
            ));
        }

        Ok(written)
    }
}

pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

fn sanitize_subject(subject_id: &str) -> String {
    let cleaned: String = subject_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::models::fixtures::{at, FallBackZone};
    use image::{Rgb, RgbImage};

    #[test]
    fn derive_path_is_pure() {
        let store = ImageStore::new("/srv/plants");
        let ts = at(2024, 5, 1, 8, 0, 0);
        let first = store.derive_path(ImageCategory::Individual, "P1", &ts);
        let second = store.derive_path(ImageCategory::Individual, "P1", &ts);
        assert_eq!(first, second);
        assert_eq!(
            first,
            PathBuf::from("/srv/plants/images/individual/P1_20240501_080000.jpg")
        );
    }

    #[test]
    fn derive_path_separates_categories_subjects_and_times() {
        let store = ImageStore::new("data");
        let ts = at(2024, 5, 1, 8, 0, 0);
        let later = at(2024, 5, 1, 8, 0, 1);
        let a = store.derive_path(ImageCategory::Daily, "main", &ts);
        assert_ne!(a, store.derive_path(ImageCategory::Timelapse, "main", &ts));
        assert_ne!(a, store.derive_path(ImageCategory::Daily, "P1", &ts));
        assert_ne!(a, store.derive_path(ImageCategory::Daily, "main", &later));
    }

    #[test]
    fn repeated_dst_hour_does_not_overwrite_earlier_frame() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        store.ensure_directories().unwrap();

        let repeated = FallBackZone.with_ymd_and_hms(2024, 11, 3, 1, 30, 0);
        let first_ts = repeated.earliest().unwrap();
        let second_ts = repeated.latest().unwrap();

        let first = store.derive_path(ImageCategory::Timelapse, "main", &first_ts);
        let second = store.derive_path(ImageCategory::Timelapse, "main", &second_ts);
        assert_ne!(first, second);
        assert!(first.ends_with("main_20241103_013000-0400.jpg"));

        let frame = RgbImage::from_pixel(8, 8, Rgb([10, 200, 10]));
        store.write(&first, &frame).unwrap();
        store.write(&second, &frame).unwrap();
        assert!(first.is_file());
        assert!(second.is_file());
    }

    #[test]
    fn subject_ids_cannot_escape_the_category_dir() {
        let store = ImageStore::new("data");
        let path = store.derive_path(ImageCategory::Individual, "../etc/x", &at(2024, 1, 1, 0, 0, 0));
        assert_eq!(
            path,
            PathBuf::from("data/images/individual/___etc_x_20240101_000000.jpg")
        );
    }

    #[test]
    fn ensure_directories_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        store.ensure_directories().unwrap();
        store.ensure_directories().unwrap();
        for category in ImageCategory::ALL {
            assert!(store.images_dir().join(category.dir_name()).is_dir());
        }
    }

    #[test]
    fn ensure_directories_rejects_a_file_as_base() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();
        let store = ImageStore::new(&file);
        assert!(matches!(
            store.ensure_directories(),
            Err(PipelineError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn write_produces_a_decodable_jpeg_and_lookup_finds_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        store.ensure_directories().unwrap();

        let ts = at(2024, 5, 1, 8, 0, 0);
        let path = store.derive_path(ImageCategory::Daily, "main", &ts);
        let frame = RgbImage::from_pixel(32, 24, Rgb([10, 200, 10]));
        let bytes = store.write(&path, &frame).unwrap();

        assert!(bytes > 0);
        assert!(!temp_sibling(&path).exists());
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
        assert_eq!(store.lookup(ImageCategory::Daily, "main", &ts), Some(path));
        assert_eq!(store.lookup(ImageCategory::Individual, "main", &ts), None);
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let path = store.derive_path(ImageCategory::Daily, "main", &at(2024, 5, 1, 8, 0, 0));
        let frame = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        assert!(matches!(
            store.write(&path, &frame),
            Err(PipelineError::PersistenceFailed { .. })
        ));
    }
}
