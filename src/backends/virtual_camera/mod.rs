// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera backend
//!
//! An in-process implementation of [`CameraBackend`] that behaves like a
//! callback-driven platform camera: every open, configure and still request
//! completes later, on a different task, in request order. Still captures
//! deliver a fixed encoded image (file, bytes or generated test pattern).
//!
//! # Architecture
//!
//! ```text
//! VirtualCameraBackend ──open──▶ VirtualDevice ──create_session──▶ VirtualSession
//!        │                            │                                 │
//!        └────────────── CallbackQueue (ordered, async) ◀───────────────┘
//!                                     │
//!                                     ▼
//!                              DeviceEventSender
//! ```
//!
//! Faults can be injected through [`VirtualFaults`] and resource accounting is
//! exposed through [`VirtualStats`], so callers can verify that every surface,
//! session, device and still slot they acquired was released.

mod device;
mod file_source;
mod frame_loop;

pub use device::{VirtualDevice, VirtualSession};
pub use file_source::{
    LoadedStill, StillSource, load_still_file, preview_rgba, still_dimensions, test_pattern_jpeg,
};
pub use frame_loop::{LoopAction, RepeatingLoop};

use crate::backends::camera::types::{
    BackendError, CameraDescriptor, DeviceEvent, DeviceEventSender, LensFacing,
};
use crate::backends::camera::CameraBackend;
use crate::constants::virtual_camera as vc;
use device::CallbackQueue;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Injectable failures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualFaults {
    /// Platform permission check fails
    pub deny_permission: bool,
    /// Open completes with `OpenFailed`
    pub fail_open: bool,
    /// Open never completes
    pub stall_open: bool,
    /// Preview surface creation fails
    pub fail_preview_surface: bool,
    /// Still sink creation fails
    pub fail_still_sink: bool,
    /// Number of upcoming session configurations that report failure
    pub configure_failures: u32,
    /// Session configuration never completes
    pub stall_configure: bool,
    /// Still requests are accepted but never produce an image
    pub drop_stills: bool,
    /// Extra delay before an image is delivered
    pub still_delay: Duration,
}

/// Resource accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtualStats {
    /// Successful opens over the backend's lifetime
    pub opens: usize,
    /// Devices currently open
    pub open_devices: usize,
    /// Surfaces currently alive
    pub live_surfaces: usize,
    /// Surfaces still alive when their device closed
    pub leaked_surfaces: usize,
    /// Sessions currently alive
    pub active_sessions: usize,
    /// Sessions closed after their device
    pub order_violations: usize,
    /// Still requests accepted
    pub still_requests: usize,
    /// Images delivered but not yet released
    pub outstanding_images: usize,
    /// Images released
    pub images_released: usize,
    /// Preview frames emitted
    pub preview_frames: u64,
}

/// Virtual camera configuration
#[derive(Debug, Clone)]
pub struct VirtualCameraConfig {
    /// Cameras reported by enumeration, in order
    pub cameras: Vec<CameraDescriptor>,
    /// Still delivered by every capture
    pub still: StillSource,
    /// Delay applied before each completion is delivered
    pub latency: Duration,
    /// Interval between preview frames
    pub preview_interval: Duration,
    pub faults: VirtualFaults,
}

impl Default for VirtualCameraConfig {
    fn default() -> Self {
        Self {
            cameras: vec![
                CameraDescriptor::new("1", "Virtual Front Camera", LensFacing::Front),
                CameraDescriptor::new("0", "Virtual Back Camera", LensFacing::Back),
            ],
            still: StillSource::TestPattern {
                width: vc::STILL_WIDTH,
                height: vc::STILL_HEIGHT,
            },
            latency: Duration::from_millis(1),
            preview_interval: vc::PREVIEW_INTERVAL,
            faults: VirtualFaults::default(),
        }
    }
}

/// State shared between the backend and the devices it opened
pub(crate) struct Shared {
    pub(crate) stats: VirtualStats,
    pub(crate) faults: VirtualFaults,
    /// Queue of the currently open device, for injected disconnects
    pub(crate) current_queue: Option<CallbackQueue>,
}

pub(crate) type SharedState = Arc<Mutex<Shared>>;

pub(crate) fn lock(shared: &SharedState) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process camera backend
#[derive(Clone)]
pub struct VirtualCameraBackend {
    config: Arc<VirtualCameraConfig>,
    shared: SharedState,
}

impl VirtualCameraBackend {
    pub fn new(config: VirtualCameraConfig) -> Self {
        info!(
            cameras = config.cameras.len(),
            still = ?config.still,
            "Creating virtual camera backend"
        );

        let shared = Shared {
            stats: VirtualStats::default(),
            faults: config.faults.clone(),
            current_queue: None,
        };

        Self {
            config: Arc::new(config),
            shared: Arc::new(Mutex::new(shared)),
        }
    }

    /// Snapshot of the resource accounting
    pub fn stats(&self) -> VirtualStats {
        lock(&self.shared).stats
    }

    /// Replace the injected faults; applies to subsequent operations
    pub fn set_faults(&self, faults: VirtualFaults) {
        lock(&self.shared).faults = faults;
    }

    /// Simulate the open device being unplugged
    pub fn disconnect(&self) -> bool {
        self.notify(DeviceEvent::Disconnected)
    }

    /// Simulate a device-level hardware error
    pub fn raise_error(&self, message: &str) -> bool {
        self.notify(DeviceEvent::Error(message.to_string()))
    }

    fn notify(&self, event: DeviceEvent) -> bool {
        match lock(&self.shared).current_queue.as_ref() {
            Some(queue) => {
                debug!(?event, "Injecting device event");
                queue.post(event);
                true
            }
            None => {
                warn!("No open device to notify");
                false
            }
        }
    }
}

impl Default for VirtualCameraBackend {
    fn default() -> Self {
        Self::new(VirtualCameraConfig::default())
    }
}

impl CameraBackend for VirtualCameraBackend {
    fn enumerate_cameras(&self) -> Vec<CameraDescriptor> {
        self.config.cameras.clone()
    }

    fn permission_granted(&self) -> bool {
        !lock(&self.shared).faults.deny_permission
    }

    fn open(&self, descriptor: &CameraDescriptor, events: DeviceEventSender) {
        info!(camera = %descriptor, generation = events.generation(), "Opening virtual camera");

        let queue = CallbackQueue::spawn(events, self.config.latency);
        let faults = lock(&self.shared).faults.clone();

        if faults.stall_open {
            debug!("Open stalled by fault injection");
            return;
        }

        if !self.config.cameras.iter().any(|c| c.id == descriptor.id) {
            queue.post(DeviceEvent::OpenFailed(BackendError::DeviceNotFound(
                descriptor.id.clone(),
            )));
            return;
        }

        if faults.fail_open {
            queue.post(DeviceEvent::OpenFailed(BackendError::Other(
                "Injected open failure".into(),
            )));
            return;
        }

        if lock(&self.shared).stats.open_devices > 0 {
            queue.post(DeviceEvent::OpenFailed(BackendError::Busy(
                descriptor.id.clone(),
            )));
            return;
        }

        let still = match self.config.still.load() {
            Ok(still) => still,
            Err(e) => {
                queue.post(DeviceEvent::OpenFailed(e));
                return;
            }
        };

        let device = VirtualDevice::new(
            descriptor.clone(),
            still,
            queue.clone(),
            Arc::clone(&self.shared),
            self.config.preview_interval,
        );

        {
            let mut shared = lock(&self.shared);
            shared.stats.opens += 1;
            shared.stats.open_devices += 1;
            shared.current_queue = Some(queue.clone());
        }

        queue.post(DeviceEvent::Opened(Box::new(device)));
    }
}
