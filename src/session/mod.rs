// SPDX-License-Identifier: GPL-3.0-only

//! Camera session controller
//!
//! [`SessionController`] is a cheap, cloneable handle to a task that owns the
//! whole camera lifecycle:
//!
//! ```text
//! SessionController ──Command──▶ ┌───────────────┐ ◀──DeviceEvent── CameraBackend
//!      (handles)    ◀──reply──── │ SessionActor  │
//!                                │  state machine │ ──RawFrame──▶ PhotoPipeline
//!   watch<SessionState> ◀─────── │  resources     │               (blocking pool)
//!   watch<PreviewFrame> ◀─────── └───────────────┘
//! ```
//!
//! Every operation that waits on the device is bounded by a timeout from
//! [`SessionConfig`]. Dropping the last handle closes the camera.

mod actor;
pub mod state;

pub use state::{Rejection, SessionInput, SessionState};

use crate::backends::camera::{
    CameraBackend, CameraDescriptor, LensFacing, PreviewFrame, PreviewSpec,
};
use crate::constants::{STILL_SINK_MAX_IMAGES, channels, timeouts};
use crate::errors::{CaptureError, CaptureResult};
use crate::pipelines::photo::{PhotoPipeline, ViewportRect};
use crate::storage::StorageReference;
use actor::{Command, Reply, SessionActor};
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Controller timing and capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub open_timeout: Duration,
    pub configure_timeout: Duration,
    pub capture_timeout: Duration,
    /// Still-frame sink capacity
    pub still_sink_max_images: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open_timeout: timeouts::OPEN,
            configure_timeout: timeouts::CONFIGURE,
            capture_timeout: timeouts::CAPTURE,
            still_sink_max_images: STILL_SINK_MAX_IMAGES,
        }
    }
}

/// Handle to a running session controller
#[derive(Clone)]
pub struct SessionController {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
    preview: watch::Receiver<Option<Arc<PreviewFrame>>>,
}

impl SessionController {
    /// Start the controller task on the current tokio runtime
    pub fn spawn(
        backend: Arc<dyn CameraBackend>,
        pipeline: PhotoPipeline,
        config: SessionConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(channels::COMMAND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(SessionState::Closed);
        let (preview_tx, preview_rx) = watch::channel(None);

        let actor = SessionActor::new(backend, pipeline, config, commands_rx, state_tx, preview_tx);
        tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            state: state_rx,
            preview: preview_rx,
        }
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> CaptureResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| CaptureError::ControllerGone)?;
        rx.await.map_err(|_| CaptureError::ControllerGone)?
    }

    /// Open a specific camera; valid only from `Closed`
    pub async fn open(&self, descriptor: CameraDescriptor) -> CaptureResult<()> {
        self.request(|reply| Command::Open { descriptor, reply })
            .await
            .map(|_| ())
    }

    /// Open the first camera with the given facing
    pub async fn open_facing(&self, facing: LensFacing) -> CaptureResult<CameraDescriptor> {
        self.request(|reply| Command::OpenFacing { facing, reply }).await
    }

    /// Create the preview surface and still sink and start the preview
    pub async fn configure_preview(&self, spec: PreviewSpec) -> CaptureResult<()> {
        self.request(|reply| Command::ConfigurePreview { spec, reply }).await
    }

    /// Open the camera with `facing` and start a preview of `spec`
    pub async fn start(
        &self,
        facing: LensFacing,
        spec: PreviewSpec,
    ) -> CaptureResult<CameraDescriptor> {
        let descriptor = self.open_facing(facing).await?;
        self.configure_preview(spec).await?;
        Ok(descriptor)
    }

    /// Take a still, crop it to `viewport` and hand it off
    ///
    /// Only one capture may be outstanding; a second call while one is in
    /// flight fails with [`CaptureError::CaptureInProgress`].
    pub async fn capture(&self, viewport: ViewportRect) -> CaptureResult<StorageReference> {
        self.request(|reply| Command::Capture { viewport, reply }).await
    }

    /// Update the preview size used to map viewports (display resize)
    pub async fn resize_preview(&self, spec: PreviewSpec) -> CaptureResult<()> {
        self.request(|reply| Command::ResizePreview { spec, reply }).await
    }

    /// Release everything and return to `Closed`; idempotent
    pub async fn close(&self) -> CaptureResult<()> {
        self.request(|reply| Command::Close { reply }).await
    }

    /// Close and stop the controller task
    pub async fn shutdown(&self) {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Ok(()) | Err(CaptureError::ControllerGone) => {}
            Err(e) => tracing::warn!(error = %e, "Controller shutdown failed"),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the session reaches `target`
    pub async fn wait_for_state(&self, target: SessionState) -> CaptureResult<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| CaptureError::ControllerGone)
    }

    /// Most recent preview frame, if the preview is running
    pub fn latest_preview_frame(&self) -> Option<Arc<PreviewFrame>> {
        self.preview.borrow().clone()
    }

    pub fn preview_frames(&self) -> watch::Receiver<Option<Arc<PreviewFrame>>> {
        self.preview.clone()
    }

    /// Preview frames as they arrive; intermediate frames may be skipped
    pub fn preview_stream(&self) -> impl Stream<Item = Arc<PreviewFrame>> + Send + 'static {
        let mut frames = self.preview.clone();
        async_stream::stream! {
            while frames.changed().await.is_ok() {
                let latest = frames.borrow_and_update().clone();
                if let Some(frame) = latest {
                    yield frame;
                }
            }
        }
    }
}
