use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::PipelineResult;

/// One decoded RGB frame.
pub type Frame = RgbImage;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Opens capture devices. Implementations must report an unopenable device
/// as `DeviceUnavailable` rather than returning a half-initialized handle.
pub trait CameraBackend: Send {
    fn open(
        &mut self,
        device_id: &str,
        requested: Resolution,
    ) -> PipelineResult<Box<dyn CaptureDevice>>;
}

/// An opened device. Only ever driven through `CameraResource`.
pub trait CaptureDevice: Send {
    /// Resolution the device actually applied, which may be lower than requested.
    fn resolution(&self) -> Resolution;

    /// Blocks until one frame is available. No internal retry.
    fn read_frame(&mut self) -> PipelineResult<Frame>;

    /// How many of the `configured` warm-up reads `CameraResource` should
    /// discard. Devices that settle exposure on their own return 0.
    fn discard_reads(&self, configured: u32) -> u32 {
        configured
    }

    /// Closes the underlying handle. Must be idempotent.
    fn release(&mut self);
}
