// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the session controller, driven by the virtual camera

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use viewfinder::CaptureError;
use viewfinder::backends::camera::{CameraDescriptor, EncodedFormat, LensFacing, PreviewSpec};
use viewfinder::backends::virtual_camera::{
    StillSource, VirtualCameraBackend, VirtualCameraConfig, VirtualFaults, VirtualStats,
};
use viewfinder::errors::Stage;
use viewfinder::pipelines::photo::{FrameProcessor, PhotoPipeline, ViewportRect};
use viewfinder::session::{SessionConfig, SessionController, SessionState};
use viewfinder::storage::{FileHandoff, FileNaming};

const PREVIEW: PreviewSpec = PreviewSpec {
    width: 108,
    height: 192,
};

const WAIT: Duration = Duration::from_secs(10);

struct Fixture {
    controller: SessionController,
    backend: VirtualCameraBackend,
    output: TempDir,
}

fn camera_config(faults: VirtualFaults) -> VirtualCameraConfig {
    VirtualCameraConfig {
        still: StillSource::TestPattern {
            width: 216,
            height: 384,
        },
        preview_interval: Duration::from_millis(10),
        faults,
        ..VirtualCameraConfig::default()
    }
}

fn fixture_with(camera: VirtualCameraConfig, session: SessionConfig) -> Fixture {
    let output = tempfile::tempdir().unwrap();
    let backend = VirtualCameraBackend::new(camera);
    let handoff = Arc::new(FileHandoff::new(output.path(), FileNaming::default()));
    let pipeline = PhotoPipeline::new(FrameProcessor::default(), handoff);
    let controller = SessionController::spawn(Arc::new(backend.clone()), pipeline, session);
    Fixture {
        controller,
        backend,
        output,
    }
}

fn fixture(faults: VirtualFaults) -> Fixture {
    fixture_with(camera_config(faults), SessionConfig::default())
}

fn short_timeouts() -> SessionConfig {
    SessionConfig {
        open_timeout: Duration::from_millis(100),
        configure_timeout: Duration::from_millis(100),
        capture_timeout: Duration::from_millis(100),
        ..SessionConfig::default()
    }
}

async fn wait_for(controller: &SessionController, state: SessionState) {
    tokio::time::timeout(WAIT, controller.wait_for_state(state))
        .await
        .expect("state not reached in time")
        .unwrap();
}

fn assert_all_released(stats: VirtualStats) {
    assert_eq!(stats.open_devices, 0, "device left open: {:?}", stats);
    assert_eq!(stats.live_surfaces, 0, "surface left alive: {:?}", stats);
    assert_eq!(stats.active_sessions, 0, "session left alive: {:?}", stats);
    assert_eq!(stats.outstanding_images, 0, "image not released: {:?}", stats);
    assert_eq!(stats.leaked_surfaces, 0, "surface outlived device: {:?}", stats);
    assert_eq!(stats.order_violations, 0, "session outlived device: {:?}", stats);
}

fn output_files(output: &TempDir) -> usize {
    std::fs::read_dir(output.path()).unwrap().count()
}

#[tokio::test]
async fn test_capture_lifecycle() {
    let f = fixture(VirtualFaults::default());
    assert_eq!(f.controller.state(), SessionState::Closed);

    let camera = f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();
    assert_eq!(camera.id, "0");
    assert_eq!(f.controller.state(), SessionState::PreviewActive);

    let reference = f
        .controller
        .capture(ViewportRect::new(10, 20, 50, 40))
        .await
        .unwrap();
    assert_eq!(f.controller.state(), SessionState::PreviewActive);
    assert!(reference.as_str().ends_with("captured_image.jpg"));

    let saved = image::open(reference.path()).unwrap();
    assert_eq!((saved.width(), saved.height()), (40, 50));

    let stats = f.backend.stats();
    assert_eq!(stats.still_requests, 1);
    assert_eq!(stats.images_released, 1);
    assert_eq!(stats.outstanding_images, 0);

    f.controller.close().await.unwrap();
    assert_eq!(f.controller.state(), SessionState::Closed);
    assert_all_released(f.backend.stats());
}

#[tokio::test]
async fn test_state_changes_are_published() {
    let f = fixture(VirtualFaults::default());
    let mut states = f.controller.subscribe_state();

    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), SessionState::PreviewActive);
}

#[tokio::test]
async fn test_preview_frames_flow_while_previewing() {
    let f = fixture(VirtualFaults::default());
    let mut stream = Box::pin(f.controller.preview_stream());

    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();

    let frame = tokio::time::timeout(WAIT, stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((frame.width, frame.height), (PREVIEW.width, PREVIEW.height));
    assert_eq!(frame.data.len(), (PREVIEW.width * PREVIEW.height * 4) as usize);
    assert!(f.controller.latest_preview_frame().is_some());

    f.controller.close().await.unwrap();
    assert!(f.controller.latest_preview_frame().is_none());
}

#[tokio::test]
async fn test_open_specific_camera() {
    let f = fixture(VirtualFaults::default());
    let front = CameraDescriptor::new("1", "Virtual Front Camera", LensFacing::Front);

    f.controller.open(front).await.unwrap();
    assert_eq!(f.controller.state(), SessionState::Opened);

    let again = f
        .controller
        .open(CameraDescriptor::new("0", "Back", LensFacing::Back))
        .await;
    assert!(matches!(
        again,
        Err(CaptureError::InvalidState {
            state: SessionState::Opened,
            ..
        })
    ));

    f.controller.close().await.unwrap();
    assert_all_released(f.backend.stats());
}

#[tokio::test]
async fn test_capture_requires_active_preview() {
    let f = fixture(VirtualFaults::default());

    let result = f.controller.capture(ViewportRect::new(0, 0, 10, 10)).await;
    assert!(matches!(
        result,
        Err(CaptureError::InvalidState {
            state: SessionState::Closed,
            ..
        })
    ));

    f.controller.open_facing(LensFacing::Back).await.unwrap();
    let result = f.controller.capture(ViewportRect::new(0, 0, 10, 10)).await;
    assert!(matches!(
        result,
        Err(CaptureError::InvalidState {
            state: SessionState::Opened,
            ..
        })
    ));
    assert_eq!(f.controller.state(), SessionState::Opened);
}

#[tokio::test]
async fn test_second_capture_rejected_while_first_in_flight() {
    let f = fixture(VirtualFaults {
        still_delay: Duration::from_millis(300),
        ..VirtualFaults::default()
    });
    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();

    let first = {
        let controller = f.controller.clone();
        tokio::spawn(async move { controller.capture(ViewportRect::new(0, 0, 50, 50)).await })
    };
    wait_for(&f.controller, SessionState::Capturing).await;

    let second = f.controller.capture(ViewportRect::new(0, 0, 20, 20)).await;
    assert_eq!(second, Err(CaptureError::CaptureInProgress));

    assert!(first.await.unwrap().is_ok());
    assert_eq!(f.backend.stats().still_requests, 1);
    assert_eq!(output_files(&f.output), 1);
}

#[tokio::test]
async fn test_close_during_capture_cancels_and_releases() {
    let f = fixture(VirtualFaults {
        still_delay: Duration::from_millis(200),
        ..VirtualFaults::default()
    });
    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();

    let pending = {
        let controller = f.controller.clone();
        tokio::spawn(async move { controller.capture(ViewportRect::new(0, 0, 50, 50)).await })
    };
    wait_for(&f.controller, SessionState::Capturing).await;

    f.controller.close().await.unwrap();
    assert_eq!(pending.await.unwrap(), Err(CaptureError::Cancelled));
    assert_eq!(f.controller.state(), SessionState::Closed);

    // The in-flight image arrives after the close and is released unprocessed
    tokio::time::sleep(Duration::from_millis(400)).await;
    let stats = f.backend.stats();
    assert_eq!(stats.images_released, 1);
    assert_all_released(stats);
    assert_eq!(output_files(&f.output), 0);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let f = fixture(VirtualFaults::default());
    f.controller.close().await.unwrap();

    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();
    f.controller.close().await.unwrap();
    f.controller.close().await.unwrap();

    assert_eq!(f.controller.state(), SessionState::Closed);
    assert_eq!(f.backend.stats().opens, 1);
    assert_all_released(f.backend.stats());
}

#[tokio::test]
async fn test_reopen_after_close() {
    let f = fixture(VirtualFaults::default());
    for _ in 0..3 {
        f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();
        f.controller
            .capture(ViewportRect::full(PREVIEW))
            .await
            .unwrap();
        f.controller.close().await.unwrap();
    }
    assert_eq!(f.backend.stats().opens, 3);
    assert_all_released(f.backend.stats());
}

#[tokio::test]
async fn test_permission_denied() {
    let f = fixture(VirtualFaults {
        deny_permission: true,
        ..VirtualFaults::default()
    });

    let result = f.controller.open_facing(LensFacing::Back).await;
    assert_eq!(result, Err(CaptureError::PermissionDenied));
    assert_eq!(f.controller.state(), SessionState::Closed);
    assert_eq!(f.backend.stats().opens, 0);
}

#[tokio::test]
async fn test_no_camera_with_requested_facing() {
    let camera = VirtualCameraConfig {
        cameras: vec![CameraDescriptor::new("1", "Selfie", LensFacing::Front)],
        ..camera_config(VirtualFaults::default())
    };
    let f = fixture_with(camera, SessionConfig::default());

    let result = f.controller.open_facing(LensFacing::Back).await;
    assert_eq!(result, Err(CaptureError::NoSuitableDevice));
    assert!(result.unwrap_err().is_session_fatal());
    assert_eq!(f.controller.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_open_failure_returns_to_closed() {
    let f = fixture(VirtualFaults {
        fail_open: true,
        ..VirtualFaults::default()
    });

    let result = f.controller.open_facing(LensFacing::Back).await;
    assert!(matches!(result, Err(CaptureError::DeviceError(_))));
    assert_eq!(f.controller.state(), SessionState::Closed);

    f.backend.set_faults(VirtualFaults::default());
    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();
}

#[tokio::test]
async fn test_configure_failure_is_retryable() {
    let f = fixture(VirtualFaults {
        configure_failures: 1,
        ..VirtualFaults::default()
    });
    f.controller.open_facing(LensFacing::Back).await.unwrap();

    let result = f.controller.configure_preview(PREVIEW).await;
    assert!(matches!(result, Err(CaptureError::ConfigureFailed(_))));
    assert!(result.unwrap_err().is_recoverable());
    assert_eq!(f.controller.state(), SessionState::Opened);

    let stats = f.backend.stats();
    assert_eq!(stats.open_devices, 1);
    assert_eq!(stats.live_surfaces, 0);

    f.controller.configure_preview(PREVIEW).await.unwrap();
    assert_eq!(f.controller.state(), SessionState::PreviewActive);
}

#[tokio::test]
async fn test_surface_failure_releases_created_surfaces() {
    let f = fixture(VirtualFaults {
        fail_still_sink: true,
        ..VirtualFaults::default()
    });
    f.controller.open_facing(LensFacing::Back).await.unwrap();

    let result = f.controller.configure_preview(PREVIEW).await;
    assert!(matches!(result, Err(CaptureError::ConfigureFailed(_))));
    assert_eq!(f.controller.state(), SessionState::Opened);
    assert_eq!(f.backend.stats().live_surfaces, 0);

    f.controller.close().await.unwrap();
    assert_all_released(f.backend.stats());
}

#[tokio::test]
async fn test_invalid_preview_size_rejected() {
    let f = fixture(VirtualFaults::default());
    f.controller.open_facing(LensFacing::Back).await.unwrap();

    let result = f.controller.configure_preview(PreviewSpec::new(0, 100)).await;
    assert!(matches!(result, Err(CaptureError::ConfigureFailed(_))));
    assert_eq!(f.controller.state(), SessionState::Opened);
}

#[tokio::test]
async fn test_disconnect_tears_down_in_order() {
    let f = fixture(VirtualFaults::default());
    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();

    assert!(f.backend.disconnect());
    wait_for(&f.controller, SessionState::Closed).await;
    assert_all_released(f.backend.stats());

    let result = f.controller.capture(ViewportRect::new(0, 0, 10, 10)).await;
    assert!(matches!(result, Err(CaptureError::InvalidState { .. })));
}

#[tokio::test]
async fn test_device_error_fails_pending_capture() {
    let f = fixture(VirtualFaults {
        still_delay: Duration::from_millis(300),
        ..VirtualFaults::default()
    });
    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();

    let pending = {
        let controller = f.controller.clone();
        tokio::spawn(async move { controller.capture(ViewportRect::new(0, 0, 50, 50)).await })
    };
    wait_for(&f.controller, SessionState::Capturing).await;

    assert!(f.backend.raise_error("sensor overheated"));
    let result = pending.await.unwrap();
    assert_eq!(
        result,
        Err(CaptureError::DeviceError("sensor overheated".into()))
    );
    assert_eq!(f.controller.state(), SessionState::Closed);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_all_released(f.backend.stats());
}

#[tokio::test]
async fn test_open_timeout() {
    let f = fixture_with(
        camera_config(VirtualFaults {
            stall_open: true,
            ..VirtualFaults::default()
        }),
        short_timeouts(),
    );

    let result = f.controller.open_facing(LensFacing::Back).await;
    assert_eq!(result, Err(CaptureError::Timeout(Stage::Open)));
    assert_eq!(f.controller.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_late_open_completion_is_closed() {
    let camera = VirtualCameraConfig {
        latency: Duration::from_millis(300),
        ..camera_config(VirtualFaults::default())
    };
    let f = fixture_with(camera, short_timeouts());

    let result = f.controller.open_facing(LensFacing::Back).await;
    assert_eq!(result, Err(CaptureError::Timeout(Stage::Open)));

    // The device opens after the deadline; the controller must close it
    tokio::time::sleep(Duration::from_millis(500)).await;
    let stats = f.backend.stats();
    assert_eq!(stats.opens, 1);
    assert_eq!(stats.open_devices, 0);
    assert_eq!(f.controller.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_configure_timeout_returns_to_opened() {
    let f = fixture_with(
        camera_config(VirtualFaults {
            stall_configure: true,
            ..VirtualFaults::default()
        }),
        short_timeouts(),
    );
    f.controller.open_facing(LensFacing::Back).await.unwrap();

    let result = f.controller.configure_preview(PREVIEW).await;
    assert_eq!(result, Err(CaptureError::Timeout(Stage::Configure)));
    assert_eq!(f.controller.state(), SessionState::Opened);
    assert_eq!(f.backend.stats().live_surfaces, 0);
}

#[tokio::test]
async fn test_capture_timeout_returns_to_preview() {
    let f = fixture_with(
        camera_config(VirtualFaults {
            drop_stills: true,
            ..VirtualFaults::default()
        }),
        short_timeouts(),
    );
    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();

    let result = f.controller.capture(ViewportRect::new(0, 0, 10, 10)).await;
    assert_eq!(result, Err(CaptureError::Timeout(Stage::Capture)));
    assert_eq!(f.controller.state(), SessionState::PreviewActive);

    f.backend.set_faults(VirtualFaults::default());
    f.controller
        .capture(ViewportRect::new(0, 0, 10, 10))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_late_image_after_capture_timeout_is_released() {
    let f = fixture_with(
        camera_config(VirtualFaults {
            still_delay: Duration::from_millis(300),
            ..VirtualFaults::default()
        }),
        short_timeouts(),
    );
    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();

    let result = f.controller.capture(ViewportRect::new(0, 0, 10, 10)).await;
    assert_eq!(result, Err(CaptureError::Timeout(Stage::Capture)));

    tokio::time::sleep(Duration::from_millis(500)).await;
    let stats = f.backend.stats();
    assert_eq!(stats.images_released, 1);
    assert_eq!(stats.outstanding_images, 0);
    assert_eq!(f.controller.state(), SessionState::PreviewActive);
    assert_eq!(output_files(&f.output), 0);
}

#[tokio::test]
async fn test_stale_image_does_not_satisfy_next_capture() {
    let session = SessionConfig {
        capture_timeout: Duration::from_millis(250),
        ..short_timeouts()
    };
    let f = fixture_with(
        camera_config(VirtualFaults {
            still_delay: Duration::from_millis(400),
            ..VirtualFaults::default()
        }),
        session,
    );
    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();

    let result = f.controller.capture(ViewportRect::new(0, 0, 10, 10)).await;
    assert_eq!(result, Err(CaptureError::Timeout(Stage::Capture)));

    // The first image lands while this capture is waiting on a request that never completes
    f.backend.set_faults(VirtualFaults {
        drop_stills: true,
        ..VirtualFaults::default()
    });
    let result = f.controller.capture(ViewportRect::new(0, 0, 10, 10)).await;
    assert_eq!(result, Err(CaptureError::Timeout(Stage::Capture)));

    let stats = f.backend.stats();
    assert_eq!(stats.still_requests, 2);
    assert_eq!(stats.images_released, 1);
    assert_eq!(stats.outstanding_images, 0);
    assert_eq!(output_files(&f.output), 0);

    f.backend.set_faults(VirtualFaults::default());
    f.controller
        .capture(ViewportRect::new(0, 0, 10, 10))
        .await
        .unwrap();
    assert_eq!(output_files(&f.output), 1);
}

#[tokio::test]
async fn test_decode_failure_keeps_preview() {
    let camera = VirtualCameraConfig {
        still: StillSource::Bytes(Arc::from(&b"not a jpeg"[..]), EncodedFormat::Jpeg),
        ..camera_config(VirtualFaults::default())
    };
    let f = fixture_with(camera, SessionConfig::default());
    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();

    let result = f.controller.capture(ViewportRect::new(0, 0, 10, 10)).await;
    assert!(matches!(result, Err(CaptureError::DecodeFailure(_))));
    assert!(result.unwrap_err().is_per_capture());
    assert_eq!(f.controller.state(), SessionState::PreviewActive);
    assert_eq!(f.backend.stats().outstanding_images, 0);
    assert_eq!(output_files(&f.output), 0);
}

#[tokio::test]
async fn test_viewport_outside_preview_fails_capture_only() {
    let f = fixture(VirtualFaults::default());
    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();

    let result = f
        .controller
        .capture(ViewportRect::new(PREVIEW.width + 5, 0, 10, 10))
        .await;
    assert!(matches!(
        result,
        Err(CaptureError::InvalidCropGeometry { .. })
    ));
    assert_eq!(f.controller.state(), SessionState::PreviewActive);
    assert_eq!(f.backend.stats().outstanding_images, 0);
}

#[tokio::test]
async fn test_resize_preview_changes_crop_mapping() {
    let f = fixture(VirtualFaults::default());
    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();

    let resized = PreviewSpec::new(216, 384);
    f.controller.resize_preview(resized).await.unwrap();

    // Only valid in the resized preview
    let reference = f
        .controller
        .capture(ViewportRect::new(150, 300, 60, 80))
        .await
        .unwrap();
    let saved = image::open(reference.path()).unwrap();
    assert_eq!((saved.width(), saved.height()), (80, 60));
}

#[tokio::test]
async fn test_shutdown_stops_controller() {
    let f = fixture(VirtualFaults::default());
    f.controller.start(LensFacing::Back, PREVIEW).await.unwrap();

    f.controller.shutdown().await;
    assert_all_released(f.backend.stats());

    let result = f.controller.open_facing(LensFacing::Back).await;
    assert_eq!(result, Err(CaptureError::ControllerGone));
}
