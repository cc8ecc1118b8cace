// SPDX-License-Identifier: MPL-2.0

//! Still photo pipeline
//!
//! ```text
//! RawFrame ──into_bytes──▶ FrameProcessor ──▶ ProcessedImage ──▶ Handoff
//!  (released)              decode/scale/       (JPEG q100)        StorageReference
//!                          crop/rotate/encode
//! ```
//!
//! The raw frame is released as soon as its bytes are copied out, and every
//! intermediate buffer is dropped before [`PhotoPipeline::run`] returns.
//! Processing never touches the live preview.

pub mod encoding;
pub mod geometry;
pub mod processing;

pub use encoding::{EncodingFormat, PhotoEncoder, ProcessedImage};
pub use geometry::{CropRect, Rotation, ScaleFactors, ViewportRect, map_viewport};
pub use processing::{FrameProcessor, ProcessorOptions};

use crate::backends::camera::types::{PreviewSpec, RawFrame};
use crate::errors::{CaptureError, CaptureResult};
use crate::storage::{Handoff, StorageReference};
use std::sync::Arc;
use tracing::{debug, warn};

/// Complete still pipeline
///
/// Orchestrates the raw frame → process → persist workflow.
#[derive(Clone)]
pub struct PhotoPipeline {
    processor: FrameProcessor,
    handoff: Arc<dyn Handoff>,
}

impl PhotoPipeline {
    pub fn new(processor: FrameProcessor, handoff: Arc<dyn Handoff>) -> Self {
        Self { processor, handoff }
    }

    /// Process and persist one still capture; blocking
    pub fn run(
        &self,
        raw: RawFrame,
        preview: PreviewSpec,
        viewport: ViewportRect,
    ) -> CaptureResult<StorageReference> {
        let format = raw.format();
        let bytes = raw.into_bytes();
        debug!(size = bytes.len(), ?format, "Raw frame released");

        let processed = self.processor.process(&bytes, format, preview, viewport);
        drop(bytes);

        let result = processed.and_then(|image| self.handoff.persist(image));
        if let Err(e) = &result {
            warn!(error = %e, "Still capture dropped");
        }
        result
    }

    /// [`PhotoPipeline::run`] on the blocking thread pool
    pub async fn run_blocking(
        &self,
        raw: RawFrame,
        preview: PreviewSpec,
        viewport: ViewportRect,
    ) -> CaptureResult<StorageReference> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.run(raw, preview, viewport))
            .await
            .map_err(|e| CaptureError::IoFailure(format!("Processing task error: {}", e)))?
    }
}
