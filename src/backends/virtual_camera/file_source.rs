// SPDX-License-Identifier: GPL-3.0-only

//! Still sources for the virtual camera
//!
//! The virtual camera delivers the same encoded still for every capture. The
//! bytes come from an image file on disk, from memory, or from a generated
//! test pattern. Preview frames are the still scaled to the preview surface.

use crate::backends::camera::types::{BackendError, BackendResult, EncodedFormat, PreviewSpec};
use crate::constants::virtual_camera::PATTERN_CELL;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Where the virtual camera's still frames come from
#[derive(Debug, Clone)]
pub enum StillSource {
    /// Encoded image file, read at device open
    File(PathBuf),
    /// Encoded bytes already in memory (may be deliberately malformed)
    Bytes(Arc<[u8]>, EncodedFormat),
    /// Generated checkerboard of the given native size
    TestPattern { width: u32, height: u32 },
}

/// Encoded still ready for delivery
#[derive(Debug, Clone)]
pub struct LoadedStill {
    pub data: Arc<[u8]>,
    pub format: EncodedFormat,
}

impl StillSource {
    /// Produce the encoded bytes for this source
    pub fn load(&self) -> BackendResult<LoadedStill> {
        match self {
            StillSource::File(path) => load_still_file(path),
            StillSource::Bytes(data, format) => Ok(LoadedStill {
                data: Arc::clone(data),
                format: *format,
            }),
            StillSource::TestPattern { width, height } => {
                let data = test_pattern_jpeg(*width, *height)?;
                Ok(LoadedStill {
                    data: Arc::from(data.into_boxed_slice()),
                    format: EncodedFormat::Jpeg,
                })
            }
        }
    }
}

/// Read an encoded image file, detecting its container from the bytes
pub fn load_still_file(path: &Path) -> BackendResult<LoadedStill> {
    info!(path = %path.display(), "Loading still image file");

    let bytes = std::fs::read(path).map_err(|e| {
        BackendError::Other(format!("Failed to read image '{}': {}", path.display(), e))
    })?;

    let format = match image::guess_format(&bytes) {
        Ok(ImageFormat::Jpeg) => EncodedFormat::Jpeg,
        Ok(ImageFormat::Png) => EncodedFormat::Png,
        _ => EncodedFormat::Unknown,
    };

    debug!(size = bytes.len(), ?format, "Still image loaded");

    Ok(LoadedStill {
        data: Arc::from(bytes.into_boxed_slice()),
        format,
    })
}

/// Generate a JPEG checkerboard with a horizontal colour gradient
///
/// The gradient makes crops and rotations distinguishable in the output.
pub fn test_pattern_jpeg(width: u32, height: u32) -> BackendResult<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(BackendError::Other(format!(
            "Invalid test pattern size {}x{}",
            width, height
        )));
    }

    let image = RgbImage::from_fn(width, height, |x, y| {
        let dark = ((x / PATTERN_CELL) + (y / PATTERN_CELL)) % 2 == 0;
        let red = (x * 255 / width.max(1)) as u8;
        let blue = (y * 255 / height.max(1)) as u8;
        if dark {
            Rgb([red / 2, 32, blue / 2])
        } else {
            Rgb([red, 200, blue])
        }
    });

    let mut buffer = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, 95);
    encoder
        .encode(
            image.as_raw(),
            width,
            height,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| BackendError::Other(format!("Test pattern encoding failed: {}", e)))?;

    Ok(buffer)
}

/// Decode a still and scale it to the preview surface as RGBA
pub fn preview_rgba(still: &LoadedStill, spec: PreviewSpec) -> BackendResult<Arc<[u8]>> {
    let decoded = image::load_from_memory(&still.data)
        .map_err(|e| BackendError::Other(format!("Failed to decode preview source: {}", e)))?;

    let scaled = decoded.resize_exact(
        spec.width,
        spec.height,
        image::imageops::FilterType::Nearest,
    );

    Ok(Arc::from(scaled.to_rgba8().into_raw().into_boxed_slice()))
}

/// Decode just the header of a still to get its native dimensions
pub fn still_dimensions(still: &LoadedStill) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(&still.data[..]))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_is_decodable_jpeg() {
        let still = StillSource::TestPattern {
            width: 320,
            height: 240,
        }
        .load()
        .unwrap();
        assert_eq!(still.format, EncodedFormat::Jpeg);
        assert_eq!(still_dimensions(&still), Some((320, 240)));
    }

    #[test]
    fn test_pattern_rejects_empty_size() {
        assert!(test_pattern_jpeg(0, 10).is_err());
    }

    #[test]
    fn test_preview_rgba_matches_spec() {
        let still = StillSource::TestPattern {
            width: 64,
            height: 48,
        }
        .load()
        .unwrap();
        let rgba = preview_rgba(&still, PreviewSpec::new(16, 12)).unwrap();
        assert_eq!(rgba.len(), 16 * 12 * 4);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = load_still_file(Path::new("/nonexistent/still.jpg"));
        assert!(result.is_err());
    }
}
