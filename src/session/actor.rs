// SPDX-License-Identifier: GPL-3.0-only

//! Session controller task
//!
//! One task owns the device, the capture session, both surfaces and the single
//! pending operation. Commands from handles and completions from the device
//! arrive on separate channels and are handled one at a time, so the lifecycle
//! never sees two inputs interleave.

use super::SessionConfig;
use super::state::{Rejection, SessionInput, SessionState};
use crate::backends::camera::{
    CameraBackend, CameraDescriptor, CameraDevice, CaptureIntent, CaptureRequest, CaptureSession,
    DeviceEvent, DeviceEventReceiver, DeviceEventSender, DeviceSelector, LensFacing, PreviewFrame,
    PreviewSpec, RawFrame, Surface, TaggedEvent,
};
use crate::backends::camera::types::BackendError;
use crate::errors::{CaptureError, CaptureResult, Stage};
use crate::pipelines::photo::{PhotoPipeline, ViewportRect};
use crate::storage::StorageReference;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

pub(crate) type Reply<T> = oneshot::Sender<CaptureResult<T>>;

/// Requests from [`super::SessionController`] handles
pub(crate) enum Command {
    Open {
        descriptor: CameraDescriptor,
        reply: Reply<CameraDescriptor>,
    },
    OpenFacing {
        facing: LensFacing,
        reply: Reply<CameraDescriptor>,
    },
    ConfigurePreview {
        spec: PreviewSpec,
        reply: Reply<()>,
    },
    ResizePreview {
        spec: PreviewSpec,
        reply: Reply<()>,
    },
    Capture {
        viewport: ViewportRect,
        reply: Reply<StorageReference>,
    },
    Close {
        reply: Reply<()>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// The one operation waiting on a device completion
enum Pending {
    Open {
        descriptor: CameraDescriptor,
        reply: Reply<CameraDescriptor>,
        deadline: Instant,
    },
    Configure {
        reply: Reply<()>,
        deadline: Instant,
    },
    Capture {
        sequence: u64,
        preview: PreviewSpec,
        viewport: ViewportRect,
        reply: Reply<StorageReference>,
        deadline: Instant,
    },
}

impl Pending {
    fn deadline(&self) -> Instant {
        match self {
            Pending::Open { deadline, .. }
            | Pending::Configure { deadline, .. }
            | Pending::Capture { deadline, .. } => *deadline,
        }
    }

    fn fail(self, err: CaptureError) {
        let delivered = match self {
            Pending::Open { reply, .. } => reply.send(Err(err)).is_ok(),
            Pending::Configure { reply, .. } => reply.send(Err(err)).is_ok(),
            Pending::Capture { reply, .. } => reply.send(Err(err)).is_ok(),
        };
        if !delivered {
            debug!("Caller stopped waiting before the operation finished");
        }
    }
}

fn rejected(operation: &'static str, rejection: Rejection) -> CaptureError {
    match rejection {
        Rejection::CaptureInProgress => CaptureError::CaptureInProgress,
        Rejection::Invalid { state, .. } => CaptureError::InvalidState { operation, state },
    }
}

fn respond<T>(reply: Reply<T>, result: CaptureResult<T>) {
    if reply.send(result).is_err() {
        debug!("Caller stopped waiting for reply");
    }
}

pub(crate) struct SessionActor {
    backend: Arc<dyn CameraBackend>,
    pipeline: PhotoPipeline,
    config: SessionConfig,

    commands: mpsc::Receiver<Command>,
    events: DeviceEventReceiver,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    state_tx: watch::Sender<SessionState>,
    preview_tx: watch::Sender<Option<Arc<PreviewFrame>>>,

    state: SessionState,
    generation: u64,
    device: Option<Box<dyn CameraDevice>>,
    session: Option<Box<dyn CaptureSession>>,
    preview_surface: Option<Surface>,
    still_sink: Option<Surface>,
    preview_spec: Option<PreviewSpec>,
    still_sequence: u64,
    pending: Option<Pending>,
}

impl SessionActor {
    pub(crate) fn new(
        backend: Arc<dyn CameraBackend>,
        pipeline: PhotoPipeline,
        config: SessionConfig,
        commands: mpsc::Receiver<Command>,
        state_tx: watch::Sender<SessionState>,
        preview_tx: watch::Sender<Option<Arc<PreviewFrame>>>,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            backend,
            pipeline,
            config,
            commands,
            events,
            events_tx,
            state_tx,
            preview_tx,
            state: SessionState::Closed,
            generation: 0,
            device: None,
            session: None,
            preview_surface: None,
            still_sink: None,
            preview_spec: None,
            still_sequence: 0,
            pending: None,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Session controller started");

        loop {
            let deadline = self.pending.as_ref().map(Pending::deadline);

            tokio::select! {
                biased;

                Some(tagged) = self.events.recv() => self.handle_event(tagged).await,

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.teardown(CaptureError::Cancelled);
                        respond(reply, Ok(()));
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All controller handles dropped");
                        self.teardown(CaptureError::Cancelled);
                        break;
                    }
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.handle_timeout();
                }
            }
        }

        info!("Session controller stopped");
    }

    fn transition(&mut self, input: SessionInput) {
        match self.state.on(input) {
            Ok(next) => {
                if next != self.state {
                    debug!(from = %self.state, to = %next, ?input, "Session state transition");
                }
                self.state = next;
                self.state_tx.send_replace(next);
            }
            Err(rejection) => {
                warn!(state = %self.state, ?input, %rejection, "Ignoring invalid transition");
            }
        }
    }

    fn device_mut(&mut self) -> CaptureResult<&mut Box<dyn CameraDevice>> {
        let state = self.state;
        self.device.as_mut().ok_or(CaptureError::InvalidState {
            operation: "use the device",
            state,
        })
    }

    // ===== Commands =====

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open { descriptor, reply } => self.open(descriptor, reply),
            Command::OpenFacing { facing, reply } => {
                if let Err(rejection) = self.state.on(SessionInput::Open) {
                    return respond(reply, Err(rejected("open", rejection)));
                }
                match DeviceSelector::new(facing).select_from(self.backend.as_ref()) {
                    Some(descriptor) => self.open(descriptor, reply),
                    None => {
                        warn!(%facing, "No camera with the requested facing");
                        respond(reply, Err(CaptureError::NoSuitableDevice));
                    }
                }
            }
            Command::ConfigurePreview { spec, reply } => self.configure_preview(spec, reply),
            Command::ResizePreview { spec, reply } => {
                let result = if !self.state.holds_device() {
                    Err(CaptureError::InvalidState {
                        operation: "resize the preview",
                        state: self.state,
                    })
                } else if !spec.is_valid() {
                    Err(CaptureError::ConfigureFailed(format!(
                        "Invalid preview size {}",
                        spec
                    )))
                } else {
                    debug!(%spec, "Preview size updated");
                    self.preview_spec = Some(spec);
                    Ok(())
                };
                respond(reply, result);
            }
            Command::Capture { viewport, reply } => self.capture(viewport, reply),
            Command::Close { reply } => {
                if self.state != SessionState::Closed {
                    info!(state = %self.state, "Closing camera session");
                }
                self.teardown(CaptureError::Cancelled);
                respond(reply, Ok(()));
            }
            // Handled by the run loop
            Command::Shutdown { reply } => respond(reply, Ok(())),
        }
    }

    fn open(&mut self, descriptor: CameraDescriptor, reply: Reply<CameraDescriptor>) {
        if let Err(rejection) = self.state.on(SessionInput::Open) {
            return respond(reply, Err(rejected("open", rejection)));
        }
        if !self.backend.permission_granted() {
            warn!(camera = %descriptor, "Camera permission denied");
            return respond(reply, Err(CaptureError::PermissionDenied));
        }

        self.generation += 1;
        info!(camera = %descriptor, generation = self.generation, "Opening camera");

        self.transition(SessionInput::Open);
        self.pending = Some(Pending::Open {
            descriptor: descriptor.clone(),
            reply,
            deadline: Instant::now() + self.config.open_timeout,
        });

        let sender = DeviceEventSender::new(self.generation, self.events_tx.clone());
        self.backend.open(&descriptor, sender);
    }

    fn configure_preview(&mut self, spec: PreviewSpec, reply: Reply<()>) {
        if let Err(rejection) = self.state.on(SessionInput::ConfigurePreview) {
            return respond(reply, Err(rejected("configure the preview", rejection)));
        }
        if !spec.is_valid() {
            return respond(
                reply,
                Err(CaptureError::ConfigureFailed(format!(
                    "Invalid preview size {}",
                    spec
                ))),
            );
        }

        self.transition(SessionInput::ConfigurePreview);
        let max_images = self.config.still_sink_max_images;

        let surfaces = self.device_mut().and_then(|device| {
            let preview = device
                .create_preview_surface(spec)
                .map_err(|e| CaptureError::ConfigureFailed(e.to_string()))?;
            match device.create_still_sink(spec, max_images) {
                Ok(still) => Ok((preview, still)),
                Err(e) => {
                    device.release_surface(preview);
                    Err(CaptureError::ConfigureFailed(e.to_string()))
                }
            }
        });

        let (preview, still) = match surfaces {
            Ok(surfaces) => surfaces,
            Err(e) => {
                warn!(error = %e, "Preview surface creation failed");
                self.configure_failed();
                return respond(reply, Err(e));
            }
        };

        let outputs = [preview.id, still.id];
        self.preview_surface = Some(preview);
        self.still_sink = Some(still);
        self.preview_spec = Some(spec);

        debug!(%spec, "Configuring capture session");
        self.pending = Some(Pending::Configure {
            reply,
            deadline: Instant::now() + self.config.configure_timeout,
        });

        if let Ok(device) = self.device_mut() {
            device.create_session(&outputs);
        }
    }

    fn capture(&mut self, viewport: ViewportRect, reply: Reply<StorageReference>) {
        if let Err(rejection) = self.state.on(SessionInput::Capture) {
            return respond(reply, Err(rejected("capture", rejection)));
        }

        let preview = match self.preview_spec {
            Some(preview) => preview,
            None => {
                return respond(
                    reply,
                    Err(CaptureError::InvalidState {
                        operation: "capture",
                        state: self.state,
                    }),
                );
            }
        };

        let sequence = self.still_sequence + 1;
        let request = match self.still_sink.as_ref() {
            Some(sink) => CaptureRequest::new(CaptureIntent::Still, sink)
                .map(|request| request.with_sequence(sequence))
                .map_err(|e| CaptureError::RequestRejected(e.to_string())),
            None => Err(CaptureError::InvalidState {
                operation: "capture",
                state: self.state,
            }),
        };

        let issued = request.and_then(|request| match self.session.as_mut() {
            Some(session) => session
                .capture(request)
                .map_err(|e| CaptureError::RequestRejected(e.to_string())),
            None => Err(CaptureError::InvalidState {
                operation: "capture",
                state: self.state,
            }),
        });

        if let Err(e) = issued {
            warn!(error = %e, "Still request not issued");
            return respond(reply, Err(e));
        }

        debug!(sequence, ?viewport, %preview, "Still request issued");
        self.still_sequence = sequence;
        self.transition(SessionInput::Capture);
        self.pending = Some(Pending::Capture {
            sequence,
            preview,
            viewport,
            reply,
            deadline: Instant::now() + self.config.capture_timeout,
        });
    }

    // ===== Device events =====

    async fn handle_event(&mut self, tagged: TaggedEvent) {
        if tagged.generation != self.generation {
            self.discard_stale(tagged);
            return;
        }

        match tagged.event {
            DeviceEvent::Opened(device) => self.on_opened(device),
            DeviceEvent::OpenFailed(e) => {
                if !matches!(self.pending, Some(Pending::Open { .. })) {
                    debug!(error = %e, "Open failure without a pending open");
                    return;
                }
                warn!(error = %e, "Camera open failed");
                let err = match e {
                    BackendError::DeviceNotFound(_) => CaptureError::NoSuitableDevice,
                    other => CaptureError::DeviceError(other.to_string()),
                };
                self.teardown(err);
            }
            DeviceEvent::SessionConfigured(session) => self.on_configured(session),
            DeviceEvent::SessionConfigureFailed(reason) => {
                if self.state != SessionState::PreviewConfiguring {
                    debug!(%reason, "Configure failure outside configuration");
                    return;
                }
                warn!(%reason, "Capture session configuration failed");
                if let Some(pending) = self.pending.take() {
                    pending.fail(CaptureError::ConfigureFailed(reason));
                }
                self.configure_failed();
            }
            DeviceEvent::ImageAvailable { sequence, frame } => self.on_image(sequence, frame).await,
            DeviceEvent::PreviewFrame(frame) => {
                if self.state.is_previewing() {
                    self.preview_tx.send_replace(Some(Arc::new(frame)));
                }
            }
            DeviceEvent::Disconnected => {
                error!(state = %self.state, "Camera disconnected");
                self.teardown(CaptureError::DeviceError("camera disconnected".into()));
            }
            DeviceEvent::Error(message) => {
                error!(state = %self.state, %message, "Camera device error");
                self.teardown(CaptureError::DeviceError(message));
            }
        }
    }

    fn on_opened(&mut self, device: Box<dyn CameraDevice>) {
        let (descriptor, reply) = match self.pending.take() {
            Some(Pending::Open {
                descriptor, reply, ..
            }) => (descriptor, reply),
            other => {
                self.pending = other;
                warn!("Unexpected device open completion, closing device");
                device.close();
                return;
            }
        };

        info!(camera = %descriptor, "Camera opened");
        self.device = Some(device);
        self.transition(SessionInput::DeviceOpened);
        respond(reply, Ok(descriptor));
    }

    fn on_configured(&mut self, mut session: Box<dyn CaptureSession>) {
        if self.state != SessionState::PreviewConfiguring {
            debug!(state = %self.state, "Late session configuration, closing it");
            session.close();
            return;
        }

        let started = match self.preview_surface.as_ref() {
            Some(surface) => CaptureRequest::new(CaptureIntent::Preview, surface)
                .and_then(|request| session.set_repeating_request(request))
                .map_err(|e| CaptureError::ConfigureFailed(e.to_string())),
            None => Err(CaptureError::ConfigureFailed(
                "Preview surface missing".into(),
            )),
        };

        let reply = match self.pending.take() {
            Some(Pending::Configure { reply, .. }) => Some(reply),
            other => {
                self.pending = other;
                None
            }
        };

        match started {
            Ok(()) => {
                info!(spec = ?self.preview_spec, "Preview active");
                self.session = Some(session);
                self.transition(SessionInput::Configured);
                if let Some(reply) = reply {
                    respond(reply, Ok(()));
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to start repeating preview request");
                session.close();
                self.configure_failed();
                if let Some(reply) = reply {
                    respond(reply, Err(e));
                }
            }
        }
    }

    async fn on_image(&mut self, sequence: u64, frame: RawFrame) {
        let pending = match self.pending.take() {
            Some(Pending::Capture {
                sequence: expected,
                preview,
                viewport,
                reply,
                ..
            }) if self.state == SessionState::Capturing && sequence == expected => {
                (preview, viewport, reply)
            }
            other => {
                self.pending = other;
                warn!(
                    sequence,
                    ?frame,
                    state = %self.state,
                    "Image without a matching pending capture, releasing"
                );
                drop(frame);
                return;
            }
        };

        let (preview, viewport, reply) = pending;
        debug!(size = frame.len(), "Still image available");

        let result = self.pipeline.run_blocking(frame, preview, viewport).await;
        if let Ok(reference) = &result {
            info!(reference = %reference, "Photo captured");
        }

        self.transition(SessionInput::CaptureFinished);
        respond(reply, result);
    }

    fn discard_stale(&mut self, tagged: TaggedEvent) {
        debug!(
            generation = tagged.generation,
            current = self.generation,
            event = ?tagged.event,
            "Discarding stale device event"
        );
        match tagged.event {
            DeviceEvent::Opened(device) => device.close(),
            DeviceEvent::SessionConfigured(session) => session.close(),
            other => drop(other),
        }
    }

    // ===== Timeouts =====

    fn handle_timeout(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        match pending {
            Pending::Open { .. } => {
                warn!(timeout = ?self.config.open_timeout, "Camera open timed out");
                self.pending = Some(pending);
                self.teardown(CaptureError::Timeout(Stage::Open));
            }
            Pending::Configure { reply, .. } => {
                warn!(timeout = ?self.config.configure_timeout, "Session configuration timed out");
                self.configure_failed();
                respond(reply, Err(CaptureError::Timeout(Stage::Configure)));
            }
            Pending::Capture { reply, .. } => {
                warn!(timeout = ?self.config.capture_timeout, "Still capture timed out");
                self.transition(SessionInput::CaptureFinished);
                respond(reply, Err(CaptureError::Timeout(Stage::Capture)));
            }
        }
    }

    // ===== Teardown =====

    fn release_surfaces(&mut self) {
        let surfaces = [self.still_sink.take(), self.preview_surface.take()];
        match self.device.as_mut() {
            Some(device) => {
                for surface in surfaces.into_iter().flatten() {
                    device.release_surface(surface);
                }
            }
            None if surfaces.iter().any(Option::is_some) => {
                warn!("Surfaces outlived their device");
            }
            None => {}
        }
    }

    /// Back to `Opened`: surfaces released, device kept
    fn configure_failed(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.release_surfaces();
        self.preview_spec = None;
        self.transition(SessionInput::ConfigureFailed);
    }

    /// Release everything in reverse acquisition order and return to `Closed`
    ///
    /// Any pending operation is failed with `reason`. Safe to call repeatedly.
    fn teardown(&mut self, reason: CaptureError) {
        if let Some(pending) = self.pending.take() {
            pending.fail(reason);
        }

        // Frames already delivered for this device go back to the sink before
        // the session closes.
        while let Ok(tagged) = self.events.try_recv() {
            if tagged.generation == self.generation {
                debug!(event = ?tagged.event, "Draining device event during teardown");
            }
            match tagged.event {
                DeviceEvent::Opened(device) => device.close(),
                DeviceEvent::SessionConfigured(session) => session.close(),
                other => drop(other),
            }
        }

        if let Some(session) = self.session.take() {
            debug!("Closing capture session");
            session.close();
        }
        self.release_surfaces();
        if let Some(device) = self.device.take() {
            debug!(camera = %device.descriptor(), "Closing camera device");
            device.close();
        }

        self.preview_spec = None;
        self.preview_tx.send_replace(None);

        // Completions still in flight from this device are stale from now on
        self.generation += 1;

        if self.state != SessionState::Closed {
            self.transition(SessionInput::Close);
        }
    }
}
