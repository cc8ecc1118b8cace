// SPDX-License-Identifier: MPL-2.0

//! Viewfinder - single-shot still capture
//!
//! This library drives a camera through its session lifecycle and turns one
//! still capture into a cropped, rotated, encoded photo on disk.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera backend abstraction and the in-process virtual camera
//! - [`session`]: Session controller (lifecycle state machine, resources, timeouts)
//! - [`pipelines`]: Still processing (decode, scale, crop, rotate, encode)
//! - [`storage`]: Handoff of finished photos to disk
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use viewfinder::backends::camera::{LensFacing, PreviewSpec};
//! use viewfinder::backends::virtual_camera::VirtualCameraBackend;
//! use viewfinder::pipelines::photo::{FrameProcessor, PhotoPipeline, ViewportRect};
//! use viewfinder::session::{SessionConfig, SessionController};
//! use viewfinder::storage::{FileHandoff, FileNaming};
//!
//! # async fn run() -> viewfinder::CaptureResult<()> {
//! let handoff = Arc::new(FileHandoff::new("/tmp/photos", FileNaming::default()));
//! let pipeline = PhotoPipeline::new(FrameProcessor::default(), handoff);
//! let backend = Arc::new(VirtualCameraBackend::default());
//! let controller = SessionController::spawn(backend, pipeline, SessionConfig::default());
//!
//! controller
//!     .start(LensFacing::Back, PreviewSpec::new(1080, 1920))
//!     .await?;
//! let reference = controller
//!     .capture(ViewportRect::new(100, 400, 800, 800))
//!     .await?;
//! println!("saved {}", reference);
//! controller.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use errors::{CaptureError, CaptureResult};
pub use session::{SessionController, SessionState};
pub use storage::StorageReference;
