// SPDX-License-Identifier: MPL-2.0

//! Viewport to pixel-space mapping
//!
//! The viewport is an on-screen rectangle in display coordinates (the same
//! space as the preview surface). Cropping needs it in the coordinate space of
//! the pixel buffer, so it is scaled by the buffer/preview ratio and then
//! clamped so the resulting rectangle never reaches outside the buffer.

use crate::backends::camera::types::PreviewSpec;
use crate::errors::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};

/// Caller-supplied region of interest, in display coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewportRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl ViewportRect {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// The whole preview surface
    pub fn full(preview: PreviewSpec) -> Self {
        Self::new(0, 0, preview.width, preview.height)
    }

    /// Parse "LEFT,TOP,WIDTH,HEIGHT"
    pub fn parse(value: &str) -> Option<Self> {
        let parts = value
            .split(',')
            .map(|p| p.trim().parse::<u32>().ok())
            .collect::<Option<Vec<_>>>()?;
        match parts.as_slice() {
            [left, top, width, height] => Some(Self::new(*left, *top, *width, *height)),
            _ => None,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the rectangle lies entirely within `[0,W)×[0,H)` of the preview
    pub fn is_inside(&self, preview: PreviewSpec) -> bool {
        !self.is_degenerate()
            && u64::from(self.left) + u64::from(self.width) <= u64::from(preview.width)
            && u64::from(self.top) + u64::from(self.height) <= u64::from(preview.height)
    }
}

/// Ratio of pixel-buffer dimensions to preview dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub sx: f64,
    pub sy: f64,
}

impl ScaleFactors {
    /// `buffer / preview` per axis; `None` when either side is empty
    pub fn between(preview: PreviewSpec, buffer: (u32, u32)) -> Option<Self> {
        if !preview.is_valid() || buffer.0 == 0 || buffer.1 == 0 {
            return None;
        }
        Some(Self {
            sx: f64::from(buffer.0) / f64::from(preview.width),
            sy: f64::from(buffer.1) / f64::from(preview.height),
        })
    }
}

/// Crop rectangle in pixel-buffer coordinates
///
/// Always contained in the buffer it was mapped against and never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }
}

impl From<ViewportRect> for CropRect {
    fn from(rect: ViewportRect) -> Self {
        Self {
            left: rect.left,
            top: rect.top,
            width: rect.width,
            height: rect.height,
        }
    }
}

/// Map a viewport on `preview` into a `buffer` of `(width, height)` pixels
///
/// The viewport is scaled by `buffer / preview` and truncated, the origin is
/// clamped into the buffer and the extent is cut at the buffer edge:
///
/// ```text
/// left'   = clamp(left * sx, 0, W - 1)
/// top'    = clamp(top * sy, 0, H - 1)
/// width'  = min(max(1, width * sx), W - left * sx)
/// height' = min(max(1, height * sy), H - top * sy)
/// ```
///
/// A non-empty viewport never shrinks below one pixel, so a viewport inside
/// the preview always maps to a non-empty rectangle. A viewport that starts
/// beyond the buffer edge, or has zero width or height, yields a non-positive
/// extent and is rejected with [`CaptureError::InvalidCropGeometry`].
pub fn map_viewport(
    viewport: ViewportRect,
    preview: PreviewSpec,
    buffer: (u32, u32),
) -> CaptureResult<CropRect> {
    let (buffer_w, buffer_h) = (i64::from(buffer.0), i64::from(buffer.1));
    let Some(scale) = ScaleFactors::between(preview, buffer) else {
        return Err(CaptureError::InvalidCropGeometry {
            width: buffer_w,
            height: buffer_h,
        });
    };

    let mapped_left = scaled(viewport.left, scale.sx);
    let mapped_top = scaled(viewport.top, scale.sy);
    let mapped_width = scaled_extent(viewport.width, scale.sx);
    let mapped_height = scaled_extent(viewport.height, scale.sy);

    let left = mapped_left.clamp(0, buffer_w - 1);
    let top = mapped_top.clamp(0, buffer_h - 1);
    let width = mapped_width.min(buffer_w - mapped_left);
    let height = mapped_height.min(buffer_h - mapped_top);

    if width <= 0 || height <= 0 {
        return Err(CaptureError::InvalidCropGeometry { width, height });
    }

    // Positive extents imply the origin was inside the buffer, so every value
    // below fits in u32.
    Ok(CropRect {
        left: left as u32,
        top: top as u32,
        width: width as u32,
        height: height as u32,
    })
}

fn scaled(value: u32, factor: f64) -> i64 {
    (f64::from(value) * factor) as i64
}

fn scaled_extent(size: u32, factor: f64) -> i64 {
    match size {
        0 => 0,
        _ => scaled(size, factor).max(1),
    }
}

/// Clockwise rotation applied to the cropped buffer
///
/// The capture flow applies a fixed quarter turn regardless of what the
/// sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    /// No rotation
    None,
    /// 90 degrees clockwise
    #[default]
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl Rotation {
    /// Create rotation from a degree value (normalised to 0-360)
    ///
    /// Returns `None` for angles that are not a multiple of 90.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Rotate90),
            180 => Some(Rotation::Rotate180),
            270 => Some(Rotation::Rotate270),
            _ => None,
        }
    }

    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREVIEW: PreviewSpec = PreviewSpec {
        width: 1080,
        height: 1920,
    };

    fn crop(viewport: ViewportRect, buffer: (u32, u32)) -> CaptureResult<CropRect> {
        map_viewport(viewport, PREVIEW, buffer)
    }

    fn assert_contained(rect: CropRect, buffer: (u32, u32)) {
        assert!(rect.width > 0 && rect.height > 0, "{:?} is empty", rect);
        assert!(rect.right() <= buffer.0, "{:?} exceeds width {}", rect, buffer.0);
        assert!(rect.bottom() <= buffer.1, "{:?} exceeds height {}", rect, buffer.1);
    }

    #[test]
    fn test_identity_scale_keeps_viewport() {
        let viewport = ViewportRect::new(100, 400, 800, 800);
        assert_eq!(crop(viewport, (1080, 1920)).unwrap(), CropRect::from(viewport));
    }

    #[test]
    fn test_double_resolution_buffer() {
        let rect = crop(ViewportRect::new(100, 400, 800, 800), (2160, 3840)).unwrap();
        assert_eq!(
            rect,
            CropRect {
                left: 200,
                top: 800,
                width: 1600,
                height: 1600
            }
        );
    }

    #[test]
    fn test_partially_outside_viewport_is_clamped() {
        let rect = crop(ViewportRect::new(1000, 1800, 200, 200), (1080, 1920)).unwrap();
        assert_eq!(
            rect,
            CropRect {
                left: 1000,
                top: 1800,
                width: 80,
                height: 120
            }
        );
        assert_contained(rect, (1080, 1920));
    }

    #[test]
    fn test_full_viewport_covers_buffer() {
        for buffer in [(1080, 1920), (2160, 3840), (540, 960)] {
            let rect = crop(ViewportRect::full(PREVIEW), buffer).unwrap();
            assert_eq!(
                rect,
                CropRect {
                    left: 0,
                    top: 0,
                    width: buffer.0,
                    height: buffer.1
                }
            );
        }
    }

    #[test]
    fn test_viewports_inside_preview_stay_inside_buffer() {
        let buffers = [(1080, 1920), (2160, 3840), (1000, 1777), (3000, 4000)];
        for buffer in buffers {
            for left in (0..1080).step_by(97) {
                for top in (0..1920).step_by(211) {
                    for (width, height) in [(1, 1), (3, 2), (50, 70), (1080 - left, 1920 - top)] {
                        let viewport = ViewportRect::new(left, top, width, height);
                        if !viewport.is_inside(PREVIEW) {
                            continue;
                        }
                        let rect = crop(viewport, buffer).unwrap();
                        assert_contained(rect, buffer);
                    }
                }
            }
        }
    }

    #[test]
    fn test_degenerate_viewport_rejected() {
        let result = crop(ViewportRect::new(10, 10, 0, 50), (1080, 1920));
        assert!(matches!(
            result,
            Err(CaptureError::InvalidCropGeometry { width: 0, .. })
        ));
    }

    #[test]
    fn test_viewport_beyond_buffer_rejected() {
        let result = crop(ViewportRect::new(1100, 10, 50, 50), (1080, 1920));
        assert!(matches!(
            result,
            Err(CaptureError::InvalidCropGeometry { .. })
        ));
    }

    #[test]
    fn test_shrinking_scale_keeps_small_viewport() {
        let viewport = ViewportRect::new(0, 0, 5, 5);
        assert!(viewport.is_inside(PREVIEW));
        let rect = crop(viewport, (108, 192)).unwrap();
        assert_eq!(
            rect,
            CropRect {
                left: 0,
                top: 0,
                width: 1,
                height: 1
            }
        );

        // Last pixel of a tenth-size buffer
        let rect = crop(ViewportRect::new(1075, 1915, 5, 5), (108, 192)).unwrap();
        assert_eq!((rect.left, rect.top, rect.width, rect.height), (107, 191, 1, 1));
    }

    #[test]
    fn test_invalid_preview_or_buffer_rejected() {
        let viewport = ViewportRect::new(0, 0, 5, 5);
        assert!(map_viewport(viewport, PreviewSpec::new(0, 1920), (108, 192)).is_err());
        assert!(map_viewport(viewport, PREVIEW, (0, 192)).is_err());
    }

    #[test]
    fn test_scale_factors_reject_empty_sizes() {
        assert!(ScaleFactors::between(PreviewSpec::new(0, 10), (10, 10)).is_none());
        assert!(ScaleFactors::between(PREVIEW, (0, 10)).is_none());
    }

    #[test]
    fn test_viewport_parse() {
        assert_eq!(
            ViewportRect::parse("100, 400,800,800"),
            Some(ViewportRect::new(100, 400, 800, 800))
        );
        assert_eq!(ViewportRect::parse("1,2,3"), None);
        assert_eq!(ViewportRect::parse("-1,2,3,4"), None);
    }

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(90), Some(Rotation::Rotate90));
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Rotate270));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::default(), Rotation::Rotate90);
    }
}
