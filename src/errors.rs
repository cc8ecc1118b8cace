// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture core
//!
//! [`CaptureError`] is the single error surfaced by the session controller, the
//! frame processor and the handoff stage. Each variant maps to one failure kind
//! of the capture flow; [`CaptureError::is_session_fatal`] tells the caller
//! whether the session was torn down because of it.

use crate::session::SessionState;
use std::fmt;
use thiserror::Error;

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Suspension points of the session controller that can time out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for the device-open completion
    Open,
    /// Waiting for the session-configure completion
    Configure,
    /// Waiting for the image-available completion
    Capture,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Open => write!(f, "device open"),
            Stage::Configure => write!(f, "session configure"),
            Stage::Capture => write!(f, "still capture"),
        }
    }
}

/// Errors produced by the capture core
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The host platform did not authorize camera access
    #[error("Camera permission denied")]
    PermissionDenied,

    /// Enumeration yielded no descriptor matching the facing policy
    #[error("No suitable camera device found")]
    NoSuitableDevice,

    /// The capture session configuration was rejected (retryable)
    #[error("Failed to configure camera preview: {0}")]
    ConfigureFailed(String),

    /// Device disconnected or reported a hardware error; the session is closed
    #[error("Camera device error: {0}")]
    DeviceError(String),

    /// Captured bytes could not be decoded
    #[error("Failed to decode captured frame: {0}")]
    DecodeFailure(String),

    /// The viewport mapped to an empty crop rectangle
    #[error("Invalid crop geometry: {width}x{height}")]
    InvalidCropGeometry { width: i64, height: i64 },

    /// The processed image could not be serialized
    #[error("Failed to encode processed image: {0}")]
    EncodeFailure(String),

    /// The processed image could not be persisted
    #[error("Failed to persist image: {0}")]
    IoFailure(String),

    /// Operation is not valid in the current session state
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The backend refused a capture request (e.g. the still sink is full)
    #[error("Capture request rejected: {0}")]
    RequestRejected(String),

    /// A still capture is already outstanding
    #[error("A capture is already in progress")]
    CaptureInProgress,

    /// A completion did not arrive in time
    #[error("Timed out waiting for {0}")]
    Timeout(Stage),

    /// The pending operation was aborted by a close
    #[error("Operation cancelled by session close")]
    Cancelled,

    /// The controller task is no longer running
    #[error("Session controller is not running")]
    ControllerGone,
}

impl CaptureError {
    /// Whether the session was (or must be) closed because of this error
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::DeviceError(_) | CaptureError::NoSuitableDevice
        )
    }

    /// Whether retrying the same operation can succeed without reopening
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied
                | CaptureError::ConfigureFailed(_)
                | CaptureError::CaptureInProgress
                | CaptureError::RequestRejected(_)
                | CaptureError::Timeout(Stage::Configure | Stage::Capture)
        )
    }

    /// Whether the failure is contained to a single capture
    pub fn is_per_capture(&self) -> bool {
        matches!(
            self,
            CaptureError::DecodeFailure(_)
                | CaptureError::InvalidCropGeometry { .. }
                | CaptureError::EncodeFailure(_)
                | CaptureError::IoFailure(_)
                | CaptureError::RequestRejected(_)
        )
    }
}

/// Configuration load/save errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}
