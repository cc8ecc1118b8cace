// SPDX-License-Identifier: GPL-3.0-only

//! Virtual device and capture session

use super::file_source::{LoadedStill, preview_rgba};
use super::frame_loop::{LoopAction, RepeatingLoop};
use super::{SharedState, lock};
use crate::backends::camera::types::*;
use crate::backends::camera::{CameraDevice, CaptureSession};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Ordered, asynchronous delivery of device events
///
/// Events posted to the queue are delivered one at a time on a separate task,
/// in posting order, after the configured latency.
#[derive(Debug, Clone)]
pub(crate) struct CallbackQueue {
    tx: mpsc::UnboundedSender<(Duration, DeviceEvent)>,
}

impl CallbackQueue {
    pub(crate) fn spawn(events: DeviceEventSender, latency: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Duration, DeviceEvent)>();

        let deliver = async move {
            while let Some((delay, event)) = rx.recv().await {
                let wait = latency + delay;
                if wait.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(wait).await;
                }
                if !events.send(event) {
                    debug!("Event receiver gone, dropping remaining callbacks");
                    break;
                }
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(deliver);
            }
            Err(_) => {
                std::thread::spawn(move || {
                    match tokio::runtime::Builder::new_current_thread()
                        .enable_time()
                        .build()
                    {
                        Ok(runtime) => runtime.block_on(deliver),
                        Err(e) => warn!(error = %e, "Failed to start callback runtime"),
                    }
                });
            }
        }

        Self { tx }
    }

    /// Queue an event; false when delivery has stopped
    pub(crate) fn post(&self, event: DeviceEvent) -> bool {
        self.post_after(Duration::ZERO, event)
    }

    pub(crate) fn post_after(&self, delay: Duration, event: DeviceEvent) -> bool {
        self.tx.send((delay, event)).is_ok()
    }
}

#[derive(Debug, Clone, Copy)]
struct SurfaceInfo {
    kind: SurfaceKind,
    spec: PreviewSpec,
    max_images: usize,
}

/// An opened virtual camera
pub struct VirtualDevice {
    descriptor: CameraDescriptor,
    still: LoadedStill,
    queue: CallbackQueue,
    shared: SharedState,
    preview_interval: Duration,
    next_surface: u32,
    surfaces: HashMap<SurfaceId, SurfaceInfo>,
    closed: Arc<AtomicBool>,
}

impl VirtualDevice {
    pub(crate) fn new(
        descriptor: CameraDescriptor,
        still: LoadedStill,
        queue: CallbackQueue,
        shared: SharedState,
        preview_interval: Duration,
    ) -> Self {
        Self {
            descriptor,
            still,
            queue,
            shared,
            preview_interval,
            next_surface: 1,
            surfaces: HashMap::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn add_surface(&mut self, kind: SurfaceKind, spec: PreviewSpec, max_images: usize) -> Surface {
        let id = SurfaceId(self.next_surface);
        self.next_surface += 1;
        self.surfaces.insert(
            id,
            SurfaceInfo {
                kind,
                spec,
                max_images,
            },
        );
        lock(&self.shared).stats.live_surfaces += 1;
        debug!(?id, ?kind, %spec, "Surface created");
        Surface { id, kind, spec }
    }

    fn shutdown(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let leaked = self.surfaces.len();
        self.surfaces.clear();

        let mut shared = lock(&self.shared);
        if leaked > 0 {
            warn!(leaked, camera = %self.descriptor.id, "Device closed with live surfaces");
            shared.stats.leaked_surfaces += leaked;
            shared.stats.live_surfaces = shared.stats.live_surfaces.saturating_sub(leaked);
        }
        shared.stats.open_devices = shared.stats.open_devices.saturating_sub(1);
        shared.current_queue = None;

        info!(camera = %self.descriptor.id, "Virtual camera closed");
    }
}

impl CameraDevice for VirtualDevice {
    fn descriptor(&self) -> &CameraDescriptor {
        &self.descriptor
    }

    fn create_preview_surface(&mut self, spec: PreviewSpec) -> BackendResult<Surface> {
        if lock(&self.shared).faults.fail_preview_surface {
            return Err(BackendError::SurfaceFailed(
                "Injected preview surface failure".into(),
            ));
        }
        Ok(self.add_surface(SurfaceKind::Preview, spec, 0))
    }

    fn create_still_sink(
        &mut self,
        spec: PreviewSpec,
        max_images: usize,
    ) -> BackendResult<Surface> {
        if lock(&self.shared).faults.fail_still_sink {
            return Err(BackendError::SurfaceFailed(
                "Injected still sink failure".into(),
            ));
        }
        if max_images == 0 {
            return Err(BackendError::SurfaceFailed(
                "Still sink needs room for at least one image".into(),
            ));
        }
        Ok(self.add_surface(SurfaceKind::StillFrame, spec, max_images))
    }

    fn release_surface(&mut self, surface: Surface) {
        if self.surfaces.remove(&surface.id).is_some() {
            let mut shared = lock(&self.shared);
            shared.stats.live_surfaces = shared.stats.live_surfaces.saturating_sub(1);
            debug!(id = ?surface.id, kind = ?surface.kind, "Surface released");
        } else {
            warn!(id = ?surface.id, "Release of unknown surface");
        }
    }

    fn create_session(&mut self, outputs: &[SurfaceId]) {
        if let Some(unknown) = outputs.iter().find(|id| !self.surfaces.contains_key(id)) {
            self.queue.post(DeviceEvent::SessionConfigureFailed(format!(
                "Unknown output surface {:?}",
                unknown
            )));
            return;
        }

        {
            let mut shared = lock(&self.shared);
            if shared.faults.stall_configure {
                debug!("Session configure stalled by fault injection");
                return;
            }
            if shared.faults.configure_failures > 0 {
                shared.faults.configure_failures -= 1;
                drop(shared);
                self.queue.post(DeviceEvent::SessionConfigureFailed(
                    "Injected configure failure".into(),
                ));
                return;
            }
            shared.stats.active_sessions += 1;
        }

        let find = |kind: SurfaceKind| {
            outputs.iter().find_map(|id| {
                self.surfaces
                    .get(id)
                    .filter(|info| info.kind == kind)
                    .map(|info| (*id, *info))
            })
        };

        let session = VirtualSession {
            queue: self.queue.clone(),
            shared: self.shared.clone(),
            still: self.still.clone(),
            preview: find(SurfaceKind::Preview).map(|(id, info)| (id, info.spec)),
            still_sink: find(SurfaceKind::StillFrame).map(|(id, info)| (id, info.max_images)),
            preview_interval: self.preview_interval,
            repeating: None,
            outstanding: Arc::new(AtomicUsize::new(0)),
            device_closed: Arc::clone(&self.closed),
            closed: false,
        };

        debug!(outputs = outputs.len(), "Virtual session configured");
        self.queue
            .post(DeviceEvent::SessionConfigured(Box::new(session)));
    }

    fn close(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A configured virtual capture session
pub struct VirtualSession {
    queue: CallbackQueue,
    shared: SharedState,
    still: LoadedStill,
    preview: Option<(SurfaceId, PreviewSpec)>,
    still_sink: Option<(SurfaceId, usize)>,
    preview_interval: Duration,
    repeating: Option<RepeatingLoop>,
    outstanding: Arc<AtomicUsize>,
    device_closed: Arc<AtomicBool>,
    closed: bool,
}

impl VirtualSession {
    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(repeating) = self.repeating.take() {
            repeating.stop_detached();
        }

        let mut shared = lock(&self.shared);
        shared.stats.active_sessions = shared.stats.active_sessions.saturating_sub(1);
        if self.device_closed.load(Ordering::SeqCst) {
            warn!("Session closed after its device");
            shared.stats.order_violations += 1;
        }
    }
}

impl CaptureSession for VirtualSession {
    fn set_repeating_request(&mut self, request: CaptureRequest) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::Closed);
        }

        let (_, spec) = self
            .preview
            .filter(|(id, _)| request.intent == CaptureIntent::Preview && *id == request.target)
            .ok_or_else(|| {
                BackendError::RequestRejected("Repeating request must target the preview".into())
            })?;

        // Undecodable stills get a blank live preview
        let rgba = preview_rgba(&self.still, spec).unwrap_or_else(|e| {
            warn!(error = %e, "Preview source not decodable, streaming blank frames");
            let len = spec.width as usize * spec.height as usize * 4;
            Arc::from(vec![128u8; len].into_boxed_slice())
        });

        if let Some(previous) = self.repeating.take() {
            previous.stop_detached();
        }

        let queue = self.queue.clone();
        let shared = self.shared.clone();
        let mut sequence = 0u64;

        self.repeating = Some(RepeatingLoop::start(
            "virtual-preview",
            self.preview_interval,
            move || {
                sequence += 1;
                lock(&shared).stats.preview_frames += 1;

                let frame = PreviewFrame {
                    sequence,
                    width: spec.width,
                    height: spec.height,
                    data: Arc::clone(&rgba),
                    captured_at: Instant::now(),
                };

                if queue.post(DeviceEvent::PreviewFrame(frame)) {
                    LoopAction::Continue
                } else {
                    LoopAction::Stop
                }
            },
        ));

        Ok(())
    }

    fn capture(&mut self, request: CaptureRequest) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::Closed);
        }

        let (_, max_images) = self
            .still_sink
            .filter(|(id, _)| request.intent == CaptureIntent::Still && *id == request.target)
            .ok_or_else(|| {
                BackendError::RequestRejected(
                    "Single requests must target the still-frame sink".into(),
                )
            })?;

        if self.outstanding.load(Ordering::SeqCst) >= max_images {
            return Err(BackendError::RequestRejected(format!(
                "Still sink full: {} image(s) not yet released",
                max_images
            )));
        }

        let faults = {
            let mut shared = lock(&self.shared);
            shared.stats.still_requests += 1;
            shared.faults.clone()
        };

        if faults.drop_stills {
            debug!("Still request dropped by fault injection");
            return Ok(());
        }

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        lock(&self.shared).stats.outstanding_images += 1;

        let outstanding = Arc::clone(&self.outstanding);
        let shared = self.shared.clone();
        let frame = RawFrame::with_release(
            Arc::clone(&self.still.data),
            self.still.format,
            move || {
                outstanding.fetch_sub(1, Ordering::SeqCst);
                let mut shared = lock(&shared);
                shared.stats.outstanding_images = shared.stats.outstanding_images.saturating_sub(1);
                shared.stats.images_released += 1;
            },
        );

        debug!(sequence = request.sequence, size = frame.len(), "Still request accepted");
        let sequence = request.sequence;
        self.queue
            .post_after(faults.still_delay, DeviceEvent::ImageAvailable { sequence, frame });
        Ok(())
    }

    fn close(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for VirtualSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
