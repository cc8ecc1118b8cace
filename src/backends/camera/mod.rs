// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! The host platform's camera stack is modelled as three single-owner handles,
//! each driven by completion notifications rather than blocking calls:
//!
//! ```text
//! ┌─────────────────────┐
//! │  SessionController  │  ← Owns every handle below, consumes DeviceEvents
//! └──────────┬──────────┘
//!            │ open(descriptor, events)
//!            ▼
//! ┌─────────────────────┐
//! │   CameraBackend     │  ← Enumeration, permission, device open
//! └──────────┬──────────┘
//!            │ DeviceEvent::Opened
//!            ▼
//! ┌─────────────────────┐
//! │    CameraDevice     │  ← Surfaces, session creation
//! └──────────┬──────────┘
//!            │ DeviceEvent::SessionConfigured
//!            ▼
//! ┌─────────────────────┐
//! │   CaptureSession    │  ← Repeating preview + one-shot still requests
//! └─────────────────────┘
//! ```
//!
//! Completions for a given device are delivered in the order their triggering
//! requests were issued.

pub mod selector;
pub mod types;

pub use selector::DeviceSelector;
pub use types::*;

/// Host camera platform
pub trait CameraBackend: Send + Sync {
    /// Enumerate available cameras in platform order
    fn enumerate_cameras(&self) -> Vec<CameraDescriptor>;

    /// Whether the platform's permission system authorizes camera access
    fn permission_granted(&self) -> bool;

    /// Begin opening a device
    ///
    /// Completion is reported through `events` as [`DeviceEvent::Opened`] or
    /// [`DeviceEvent::OpenFailed`]. The device keeps `events` for all later
    /// notifications (session configuration, images, disconnects).
    fn open(&self, descriptor: &CameraDescriptor, events: DeviceEventSender);
}

/// An opened camera device
pub trait CameraDevice: Send {
    fn descriptor(&self) -> &CameraDescriptor;

    /// Create the live preview target
    fn create_preview_surface(&mut self, spec: PreviewSpec) -> BackendResult<Surface>;

    /// Create the still-frame sink holding at most `max_images` undelivered frames
    fn create_still_sink(&mut self, spec: PreviewSpec, max_images: usize)
    -> BackendResult<Surface>;

    /// Give a surface back to the device
    fn release_surface(&mut self, surface: Surface);

    /// Begin configuring a capture session over `outputs`
    ///
    /// Completion is reported as [`DeviceEvent::SessionConfigured`] or
    /// [`DeviceEvent::SessionConfigureFailed`].
    fn create_session(&mut self, outputs: &[SurfaceId]);

    /// Close the device; no events are delivered afterwards
    fn close(self: Box<Self>);
}

/// A configured capture session
pub trait CaptureSession: Send {
    /// Start a continuously repeating request (preview)
    fn set_repeating_request(&mut self, request: CaptureRequest) -> BackendResult<()>;

    /// Issue a single request; a still request completes with
    /// [`DeviceEvent::ImageAvailable`] carrying the request's sequence
    fn capture(&mut self, request: CaptureRequest) -> BackendResult<()>;

    /// Stop all requests and close the session
    fn close(self: Box<Self>);
}
