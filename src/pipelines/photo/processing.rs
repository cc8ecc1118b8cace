// SPDX-License-Identifier: MPL-2.0

//! Frame processing for still captures
//!
//! This module turns the encoded bytes of a still capture into the final photo:
//! - Decode the JPEG/PNG container
//! - Scale to the preview surface dimensions (bilinear)
//! - Map the viewport into the scaled buffer and crop
//! - Rotate by the configured quarter turn
//! - Encode
//!
//! Every step is a pure function of its inputs, so processing the same bytes
//! with the same preview, viewport and options always yields the same output.
//! All of it is CPU-bound and blocking; callers run it on a worker thread.

use super::encoding::{EncodingFormat, PhotoEncoder, ProcessedImage};
use super::geometry::{CropRect, Rotation, ViewportRect, map_viewport};
use crate::backends::camera::types::{EncodedFormat, PreviewSpec};
use crate::constants::DEFAULT_JPEG_QUALITY;
use crate::errors::{CaptureError, CaptureResult};
use image::{DynamicImage, GenericImageView};
use image::imageops::FilterType;
use tracing::{debug, info};

/// Processing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// Rotation applied after cropping
    pub rotation: Rotation,
    /// Output container
    pub format: EncodingFormat,
    /// JPEG quality (1-100), ignored for PNG
    pub jpeg_quality: u8,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            rotation: Rotation::default(),
            format: EncodingFormat::Jpeg,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Decode → scale → crop → rotate → encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameProcessor {
    options: ProcessorOptions,
    encoder: PhotoEncoder,
}

impl FrameProcessor {
    pub fn new(options: ProcessorOptions) -> Self {
        let encoder = PhotoEncoder::with(options.format, options.jpeg_quality);
        Self { options, encoder }
    }

    /// Run the full chain on the bytes of one still capture
    pub fn process(
        &self,
        bytes: &[u8],
        format: EncodedFormat,
        preview: PreviewSpec,
        viewport: ViewportRect,
    ) -> CaptureResult<ProcessedImage> {
        info!(
            size = bytes.len(),
            ?format,
            %preview,
            ?viewport,
            "Processing still capture"
        );

        let decoded = Self::decode(bytes, format)?;
        let scaled = Self::scale(decoded, preview)?;
        let rect = map_viewport(viewport, preview, scaled.dimensions())?;
        debug!(crop = ?rect, "Viewport mapped");

        let cropped = Self::crop(&scaled, rect);
        drop(scaled);

        let rotated = Self::rotate(cropped, self.options.rotation);
        let rgb = rotated.to_rgb8();
        drop(rotated);

        self.encoder.encode(&rgb)
    }

    /// Decode the capture container, honouring the format hint
    pub fn decode(bytes: &[u8], format: EncodedFormat) -> CaptureResult<DynamicImage> {
        if bytes.is_empty() {
            return Err(CaptureError::DecodeFailure("empty frame".into()));
        }

        let decoded = match format {
            EncodedFormat::Jpeg => {
                image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
            }
            EncodedFormat::Png => {
                image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            }
            EncodedFormat::Unknown => image::load_from_memory(bytes),
        }
        .map_err(|e| CaptureError::DecodeFailure(e.to_string()))?;

        debug!(
            width = decoded.width(),
            height = decoded.height(),
            "Frame decoded"
        );
        Ok(decoded)
    }

    /// Scale to the preview dimensions
    pub fn scale(image: DynamicImage, preview: PreviewSpec) -> CaptureResult<DynamicImage> {
        if !preview.is_valid() {
            return Err(CaptureError::InvalidCropGeometry {
                width: i64::from(preview.width),
                height: i64::from(preview.height),
            });
        }

        if image.dimensions() == (preview.width, preview.height) {
            return Ok(image);
        }
        Ok(image.resize_exact(preview.width, preview.height, FilterType::Triangle))
    }

    /// Copy out `rect`; the rectangle must lie inside the image
    pub fn crop(image: &DynamicImage, rect: CropRect) -> DynamicImage {
        image.crop_imm(rect.left, rect.top, rect.width, rect.height)
    }

    /// Rotate clockwise
    pub fn rotate(image: DynamicImage, rotation: Rotation) -> DynamicImage {
        match rotation {
            Rotation::None => image,
            Rotation::Rotate90 => image.rotate90(),
            Rotation::Rotate180 => image.rotate180(),
            Rotation::Rotate270 => image.rotate270(),
        }
    }
}
