// SPDX-License-Identifier: GPL-3.0-only

//! Session lifecycle state machine
//!
//! Pure transition function; the controller feeds it one input per command or
//! completion and only acts when the transition is accepted.
//!
//! ```text
//!  Closed ──Open──▶ Opening ──DeviceOpened──▶ Opened ──ConfigurePreview──▶ PreviewConfiguring
//!    ▲                 │                        ▲                                │
//!    │             OpenFailed                   └──────ConfigureFailed───────────┤
//!    │                 │                                                     Configured
//!    ├─────────────────┘                                                         ▼
//!    │                        Capturing ◀──────────Capture──────────────── PreviewActive
//!    │                            └──────────────CaptureFinished──────────────────▲
//!    │
//!    └──── Close / DeviceLost (from any state)
//! ```

use std::fmt;
use thiserror::Error;

/// Lifecycle state of the camera session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Closed,
    Opening,
    Opened,
    PreviewConfiguring,
    PreviewActive,
    Capturing,
}

impl SessionState {
    pub const ALL: [SessionState; 6] = [
        SessionState::Closed,
        SessionState::Opening,
        SessionState::Opened,
        SessionState::PreviewConfiguring,
        SessionState::PreviewActive,
        SessionState::Capturing,
    ];

    /// Whether a device handle is held
    pub fn holds_device(&self) -> bool {
        matches!(
            self,
            SessionState::Opened
                | SessionState::PreviewConfiguring
                | SessionState::PreviewActive
                | SessionState::Capturing
        )
    }

    /// Whether the repeating preview request is running
    pub fn is_previewing(&self) -> bool {
        matches!(self, SessionState::PreviewActive | SessionState::Capturing)
    }

    /// Apply one input
    pub fn on(self, input: SessionInput) -> Result<SessionState, Rejection> {
        use SessionInput as I;
        use SessionState as S;

        match (self, input) {
            (_, I::Close | I::DeviceLost) => Ok(S::Closed),
            (S::Closed, I::Open) => Ok(S::Opening),
            (S::Opening, I::DeviceOpened) => Ok(S::Opened),
            (S::Opening, I::OpenFailed) => Ok(S::Closed),
            (S::Opened, I::ConfigurePreview) => Ok(S::PreviewConfiguring),
            (S::PreviewConfiguring, I::Configured) => Ok(S::PreviewActive),
            (S::PreviewConfiguring, I::ConfigureFailed) => Ok(S::Opened),
            (S::PreviewActive, I::Capture) => Ok(S::Capturing),
            (S::Capturing, I::Capture) => Err(Rejection::CaptureInProgress),
            (S::Capturing, I::CaptureFinished) => Ok(S::PreviewActive),
            (state, input) => Err(Rejection::Invalid { state, input }),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Closed => "closed",
            SessionState::Opening => "opening",
            SessionState::Opened => "opened",
            SessionState::PreviewConfiguring => "configuring preview",
            SessionState::PreviewActive => "previewing",
            SessionState::Capturing => "capturing",
        };
        f.write_str(name)
    }
}

/// Inputs driving the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionInput {
    /// `open()` called
    Open,
    /// Device-open completion succeeded
    DeviceOpened,
    /// Device-open completion failed or timed out
    OpenFailed,
    /// `configure_preview()` called
    ConfigurePreview,
    /// Session configured and repeating request installed
    Configured,
    /// Configuration failed or timed out
    ConfigureFailed,
    /// `capture()` called
    Capture,
    /// Still delivered and processed, failed or timed out
    CaptureFinished,
    /// Device disconnected or reported an error
    DeviceLost,
    /// `close()` called
    Close,
}

/// Why an input was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("a capture is already in progress")]
    CaptureInProgress,

    #[error("{input:?} is not valid while {state}")]
    Invalid {
        state: SessionState,
        input: SessionInput,
    },
}
