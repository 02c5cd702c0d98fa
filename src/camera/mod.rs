pub mod command;
pub mod device;
pub mod resource;
pub mod still;

#[cfg(test)]
pub mod mock;

pub use command::CommandBackend;
pub use device::{CameraBackend, CaptureDevice, Frame, Resolution};
pub use resource::{CameraResource, DEFAULT_WARMUP_FRAMES};
pub use still::StillImageBackend;
