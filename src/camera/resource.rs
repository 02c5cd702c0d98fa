use std::time::Instant;

use crate::error::PipelineResult;

use super::device::{CameraBackend, CaptureDevice, Frame, Resolution};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Frames discarded after opening so exposure and focus can settle.
pub const DEFAULT_WARMUP_FRAMES: u32 = 5;

/// Exclusive handle on a capture device for the span of one session.
///
/// The device is released when this value is dropped, which covers normal
/// return, early `?` exits and unwinding alike.
pub struct CameraResource {
    device_id: String,
    device: Box<dyn CaptureDevice>,
    resolution: Resolution,
    frames_read: u64,
}

impl CameraResource {
    pub fn acquire(
        backend: &mut dyn CameraBackend,
        device_id: &str,
        requested: Resolution,
        warmup_frames: u32,
    ) -> PipelineResult<Self> {
        let open_start = Instant::now();
        let device = backend.open(device_id, requested)?;

        let mut resource = Self {
            device_id: device_id.to_string(),
            resolution: device.resolution(),
            device,
            frames_read: 0,
        };

        let discard = resource.device.discard_reads(warmup_frames);
        for attempt in 0..discard {
            if let Err(err) = resource.device.read_frame() {
                log_debug!(
                    "warm-up read {}/{} on {} failed: {err}",
                    attempt + 1,
                    discard,
                    resource.device_id
                );
            }
        }

        // Backends may only learn the applied size once frames flow.
        resource.resolution = resource.device.resolution();
        if resource.resolution != requested {
            log_warn!(
                "camera {} applied {} instead of requested {}",
                device_id,
                resource.resolution,
                requested
            );
        }

        log_info!(
            "camera {} acquired at {} in {}ms ({} warm-up frames discarded)",
            device_id,
            resource.resolution,
            open_start.elapsed().as_millis(),
            discard
        );

        Ok(resource)
    }

    pub fn read_frame(&mut self) -> PipelineResult<Frame> {
        let frame = self.device.read_frame()?;
        self.frames_read += 1;
        self.resolution = self.device.resolution();
        Ok(frame)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl Drop for CameraResource {
    fn drop(&mut self) {
        self.device.release();
        log_info!(
            "camera {} released after {} frames",
            self.device_id,
            self.frames_read
        );
    }
}
