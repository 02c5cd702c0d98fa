use thiserror::Error;

use crate::session::CaptureSession;

/// Failure taxonomy shared by every stage of a capture session.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The camera could not be opened. Fatal for the current trigger only.
    #[error("camera device '{device_id}' unavailable: {reason}")]
    DeviceUnavailable { device_id: String, reason: String },

    /// A single frame read failed.
    #[error("capture failed for {target}: {reason}")]
    CaptureFailed { target: String, reason: String },

    /// An image or metadata write failed or could not be verified.
    #[error("failed to persist {target}: {reason}")]
    PersistenceFailed { target: String, reason: String },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl PipelineError {
    pub fn device_unavailable(device_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::DeviceUnavailable {
            device_id: device_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn capture_failed(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::CaptureFailed {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence_failed(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::PersistenceFailed {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config_invalid(reason: impl Into<String>) -> Self {
        Self::ConfigInvalid(reason.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeviceUnavailable { .. } => "DeviceUnavailable",
            Self::CaptureFailed { .. } => "CaptureFailed",
            Self::PersistenceFailed { .. } => "PersistenceFailed",
            Self::ConfigInvalid(_) => "ConfigInvalid",
        }
    }
}

/// Error returned by `run_daily_session`.
///
/// When the failure happened after the record was assembled (metadata
/// persistence), the unsaved record travels with the error so the caller can
/// still log or retry it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SessionFailure {
    #[source]
    pub error: PipelineError,
    pub unsaved: Option<Box<CaptureSession>>,
}

impl SessionFailure {
    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }
}

impl From<PipelineError> for SessionFailure {
    fn from(error: PipelineError) -> Self {
        Self {
            error,
            unsaved: None,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
