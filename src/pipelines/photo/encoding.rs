// SPDX-License-Identifier: GPL-3.0-only

//! Photo encoding
//!
//! This module serializes the final pixel buffer:
//! - JPEG (with quality control, maximum by default)
//! - PNG (lossless)

use crate::constants::DEFAULT_JPEG_QUALITY;
use crate::errors::{CaptureError, CaptureResult};
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Supported encoding formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    /// JPEG format (lossy compression)
    #[default]
    Jpeg,
    /// PNG format (lossless compression)
    Png,
}

impl EncodingFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            EncodingFormat::Jpeg => "jpg",
            EncodingFormat::Png => "png",
        }
    }
}

/// Final encoded photo handed to storage
///
/// Immutable once produced; the handoff consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    data: Vec<u8>,
    format: EncodingFormat,
    width: u32,
    height: u32,
}

impl ProcessedImage {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn format(&self) -> EncodingFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Photo encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoEncoder {
    format: EncodingFormat,
    jpeg_quality: u8,
}

impl Default for PhotoEncoder {
    fn default() -> Self {
        Self::with(EncodingFormat::Jpeg, DEFAULT_JPEG_QUALITY)
    }
}

impl PhotoEncoder {
    /// Create a new encoder with JPEG format and maximum quality
    pub fn new() -> Self {
        Self::default()
    }

    /// `jpeg_quality` is clamped to 1-100 and ignored for PNG
    pub fn with(format: EncodingFormat, jpeg_quality: u8) -> Self {
        Self {
            format,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn format(&self) -> EncodingFormat {
        self.format
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Encode an RGB buffer; blocking, call from a worker thread
    pub fn encode(&self, image: &RgbImage) -> CaptureResult<ProcessedImage> {
        let data = match self.format {
            EncodingFormat::Jpeg => Self::encode_jpeg(image, self.jpeg_quality)?,
            EncodingFormat::Png => Self::encode_png(image)?,
        };

        debug!(
            size = data.len(),
            width = image.width(),
            height = image.height(),
            format = ?self.format,
            "Encoding complete"
        );

        Ok(ProcessedImage {
            data,
            format: self.format,
            width: image.width(),
            height: image.height(),
        })
    }

    /// Encode image as JPEG
    fn encode_jpeg(image: &RgbImage, quality: u8) -> CaptureResult<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);

        encoder
            .encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| CaptureError::EncodeFailure(format!("JPEG encoding failed: {}", e)))?;

        Ok(buffer)
    }

    /// Encode image as PNG
    fn encode_png(image: &RgbImage) -> CaptureResult<Vec<u8>> {
        let mut buffer = Vec::new();

        image
            .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| CaptureError::EncodeFailure(format!("PNG encoding failed: {}", e)))?;

        Ok(buffer)
    }
}
