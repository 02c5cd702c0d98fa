use std::path::PathBuf;

use crate::error::{PipelineError, PipelineResult};

use super::device::{CameraBackend, CaptureDevice, Frame, Resolution};

/// Serves one image file as every frame. Useful for dry runs without hardware.
pub struct StillImageBackend {
    path: PathBuf,
}

impl StillImageBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CameraBackend for StillImageBackend {
    fn open(
        &mut self,
        device_id: &str,
        _requested: Resolution,
    ) -> PipelineResult<Box<dyn CaptureDevice>> {
        let frame = image::open(&self.path)
            .map_err(|err| {
                PipelineError::device_unavailable(
                    device_id,
                    format!("cannot load {}: {err}", self.path.display()),
                )
            })?
            .to_rgb8();

        Ok(Box::new(StillImageDevice {
            device_id: device_id.to_string(),
            frame: Some(frame),
        }))
    }
}

struct StillImageDevice {
    device_id: String,
    frame: Option<Frame>,
}

impl CaptureDevice for StillImageDevice {
    fn resolution(&self) -> Resolution {
        self.frame
            .as_ref()
            .map(|frame| Resolution::new(frame.width(), frame.height()))
            .unwrap_or(Resolution::new(0, 0))
    }

    fn read_frame(&mut self) -> PipelineResult<Frame> {
        self.frame
            .clone()
            .ok_or_else(|| PipelineError::capture_failed(&self.device_id, "device released"))
    }

    fn release(&mut self) {
        self.frame = None;
    }
}
