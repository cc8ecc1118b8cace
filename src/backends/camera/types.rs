// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use super::{CameraDevice, CaptureSession};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

/// Direction the lens faces relative to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    Front,
    /// Rear camera (the default capture policy)
    #[default]
    Back,
    /// Detachable or USB camera
    External,
}

impl std::fmt::Display for LensFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LensFacing::Front => write!(f, "front"),
            LensFacing::Back => write!(f, "back"),
            LensFacing::External => write!(f, "external"),
        }
    }
}

/// Identifies a camera on the host platform
///
/// Selected once per session; immutable after selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CameraDescriptor {
    /// Opaque platform identifier
    pub id: String,
    /// Human readable name
    pub name: String,
    pub facing: LensFacing,
}

impl CameraDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, facing: LensFacing) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            facing,
        }
    }
}

impl std::fmt::Display for CameraDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.id, self.facing)
    }
}

/// Pixel dimensions of the live preview surface, in display pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewSpec {
    pub width: u32,
    pub height: u32,
}

impl PreviewSpec {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A preview surface needs both dimensions to be non-zero
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Parse "WIDTHxHEIGHT" (e.g. "1080x1920")
    pub fn parse(value: &str) -> Option<Self> {
        let (w, h) = value.trim().split_once(['x', 'X'])?;
        let spec = Self::new(w.trim().parse().ok()?, h.trim().parse().ok()?);
        spec.is_valid().then_some(spec)
    }
}

impl std::fmt::Display for PreviewSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Backend-assigned surface identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

/// What a surface receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// Continuously updating live preview
    Preview,
    /// Receives exactly one decodable image per still request
    StillFrame,
}

/// An output target created by a device
///
/// Surfaces are single-owner: they are not `Clone` and go back to the device
/// through [`CameraDevice::release_surface`].
#[derive(Debug, PartialEq, Eq)]
pub struct Surface {
    pub id: SurfaceId,
    pub kind: SurfaceKind,
    pub spec: PreviewSpec,
}

/// Distinguishes a repeating preview request from a one-shot still request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureIntent {
    Preview,
    Still,
}

impl CaptureIntent {
    /// The only surface kind a request with this intent may target
    pub fn target_kind(&self) -> SurfaceKind {
        match self {
            CaptureIntent::Preview => SurfaceKind::Preview,
            CaptureIntent::Still => SurfaceKind::StillFrame,
        }
    }
}

/// A request bound to exactly one target surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub intent: CaptureIntent,
    pub target: SurfaceId,
    /// Echoed back on the still request's image
    pub sequence: u64,
}

impl CaptureRequest {
    /// Build a request, rejecting a target that does not match the intent
    pub fn new(intent: CaptureIntent, target: &Surface) -> BackendResult<Self> {
        if target.kind != intent.target_kind() {
            return Err(BackendError::RequestRejected(format!(
                "{:?} request cannot target a {:?} surface",
                intent, target.kind
            )));
        }
        Ok(Self {
            intent,
            target: target.id,
            sequence: 0,
        })
    }

    pub fn with_sequence(self, sequence: u64) -> Self {
        Self { sequence, ..self }
    }
}

/// Encoding of the bytes delivered by the still-frame sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodedFormat {
    Jpeg,
    Png,
    /// Let the decoder sniff the container
    Unknown,
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Encoded still frame produced by the still-frame sink
///
/// Owned exclusively by the capture that received it. The underlying sink
/// slot is released exactly once: when [`RawFrame::into_bytes`] has copied the
/// data out, or when the frame is dropped unread.
pub struct RawFrame {
    data: Arc<[u8]>,
    format: EncodedFormat,
    release: Option<ReleaseFn>,
}

impl RawFrame {
    /// A frame with no backing resource to release
    pub fn new(data: Arc<[u8]>, format: EncodedFormat) -> Self {
        Self {
            data,
            format,
            release: None,
        }
    }

    /// A frame whose sink slot is freed by `release`
    pub fn with_release<F>(data: Arc<[u8]>, format: EncodedFormat, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            data,
            format,
            release: Some(Box::new(release)),
        }
    }

    pub fn format(&self) -> EncodedFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy the encoded bytes out and release the sink slot
    pub fn into_bytes(mut self) -> Vec<u8> {
        let bytes = self.data.to_vec();
        self.release();
        bytes
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("len", &self.data.len())
            .field("format", &self.format)
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// A decoded preview frame (RGBA)
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub captured_at: Instant,
}

/// Completion and status notifications from a device
pub enum DeviceEvent {
    /// Device-open completion
    Opened(Box<dyn CameraDevice>),
    /// Device could not be opened
    OpenFailed(BackendError),
    /// Session-configure completion
    SessionConfigured(Box<dyn CaptureSession>),
    /// Session configuration rejected
    SessionConfigureFailed(String),
    /// Image-available completion for the still request with `sequence`
    ImageAvailable { sequence: u64, frame: RawFrame },
    /// Frame produced by the repeating preview request
    PreviewFrame(PreviewFrame),
    /// Device went away
    Disconnected,
    /// Device-level hardware error
    Error(String),
}

impl std::fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceEvent::Opened(_) => write!(f, "Opened"),
            DeviceEvent::OpenFailed(e) => write!(f, "OpenFailed({})", e),
            DeviceEvent::SessionConfigured(_) => write!(f, "SessionConfigured"),
            DeviceEvent::SessionConfigureFailed(msg) => {
                write!(f, "SessionConfigureFailed({})", msg)
            }
            DeviceEvent::ImageAvailable { sequence, frame } => {
                write!(f, "ImageAvailable(#{}, {:?})", sequence, frame)
            }
            DeviceEvent::PreviewFrame(frame) => write!(f, "PreviewFrame(#{})", frame.sequence),
            DeviceEvent::Disconnected => write!(f, "Disconnected"),
            DeviceEvent::Error(msg) => write!(f, "Error({})", msg),
        }
    }
}

/// A device event tagged with the open generation it belongs to
#[derive(Debug)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: DeviceEvent,
}

/// Receiving side of the device event channel
pub type DeviceEventReceiver = mpsc::UnboundedReceiver<TaggedEvent>;

/// Sending side handed to backends for completion notification
///
/// Every event is tagged with the generation of the open that produced this
/// sender, so the controller can recognise completions from a device it has
/// already torn down.
#[derive(Debug, Clone)]
pub struct DeviceEventSender {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl DeviceEventSender {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event; returns false when the controller has gone away
    ///
    /// An undeliverable event is dropped, which releases any resource it owns.
    pub fn send(&self, event: DeviceEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Camera device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    /// Device is already opened by another client
    #[error("Device busy: {0}")]
    Busy(String),
    /// Surface or sink could not be created
    #[error("Surface creation failed: {0}")]
    SurfaceFailed(String),
    /// Request was rejected by the session
    #[error("Request rejected: {0}")]
    RequestRejected(String),
    /// Device or session already closed
    #[error("Device closed")]
    Closed,
    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}
