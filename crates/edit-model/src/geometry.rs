//! Mapping between on-screen pointer coordinates and native media pixels.
//!
//! The preview surface can be drawn at any size; crop selection always
//! happens in the source's own pixel grid.

use serde::{Deserialize, Serialize};

use crate::crop::CropRect;
use crate::media::VideoMetadata;

/// A point in display (pointer event) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A point in native media pixel space, always inside `[0, width] x [0, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// On-screen bounding rectangle of the video surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Whether the rectangle can be used to map positions (non-zero, finite extent).
    pub fn has_extent(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Fractional position of `point` inside the rectangle, clamped to `[0, 1]`.
    ///
    /// The pointer may leave the element while a drag is active, so positions
    /// outside are pinned to the nearest edge instead of rejected.
    pub fn clamped_fraction(&self, point: Point2D) -> Option<(f64, f64)> {
        if !self.has_extent() || !point.x.is_finite() || !point.y.is_finite() {
            return None;
        }
        let fx = ((point.x - self.left) / self.width).clamp(0.0, 1.0);
        let fy = ((point.y - self.top) / self.height).clamp(0.0, 1.0);
        Some((fx, fy))
    }
}

/// Map a pointer position to native pixel coordinates.
///
/// Returns `None` when metadata is not known yet or the surface has no
/// extent; callers treat that as a no-op.
pub fn normalize_pointer(
    pointer: Point2D,
    bounds: &DisplayRect,
    metadata: Option<&VideoMetadata>,
) -> Option<PixelPoint> {
    let metadata = metadata?;
    let (fx, fy) = bounds.clamped_fraction(pointer)?;
    Some(PixelPoint {
        x: fx * metadata.pixel_width as f64,
        y: fy * metadata.pixel_height as f64,
    })
}

/// Map a native pixel rectangle back onto the display surface, for drawing
/// the selection overlay.
pub fn crop_to_display(
    rect: &CropRect,
    bounds: &DisplayRect,
    metadata: &VideoMetadata,
) -> Option<DisplayRect> {
    if !bounds.has_extent() {
        return None;
    }
    let sx = bounds.width / metadata.pixel_width as f64;
    let sy = bounds.height / metadata.pixel_height as f64;
    Some(DisplayRect {
        left: bounds.left + rect.x as f64 * sx,
        top: bounds.top + rect.y as f64 * sy,
        width: rect.width as f64 * sx,
        height: rect.height as f64 * sy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> VideoMetadata {
        VideoMetadata::new(10.0, 640, 360).unwrap()
    }

    #[test]
    fn test_scales_into_native_pixels() {
        let bounds = DisplayRect::new(100.0, 50.0, 320.0, 180.0);
        let p = normalize_pointer(Point2D::new(260.0, 140.0), &bounds, Some(&meta())).unwrap();
        assert!((p.x - 320.0).abs() < 1e-9);
        assert!((p.y - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamps_outside_pointer() {
        let bounds = DisplayRect::new(0.0, 0.0, 320.0, 180.0);
        let p = normalize_pointer(Point2D::new(-40.0, 900.0), &bounds, Some(&meta())).unwrap();
        assert_eq!(p, PixelPoint::new(0.0, 360.0));
    }

    #[test]
    fn test_unavailable_without_metadata_or_extent() {
        let bounds = DisplayRect::new(0.0, 0.0, 320.0, 180.0);
        assert!(normalize_pointer(Point2D::new(1.0, 1.0), &bounds, None).is_none());

        let empty = DisplayRect::new(0.0, 0.0, 0.0, 180.0);
        assert!(normalize_pointer(Point2D::new(1.0, 1.0), &empty, Some(&meta())).is_none());
    }

    #[test]
    fn test_crop_to_display_inverts_mapping() {
        let bounds = DisplayRect::new(10.0, 20.0, 320.0, 180.0);
        let rect = CropRect::new(64, 36, 320, 180);
        let shown = crop_to_display(&rect, &bounds, &meta()).unwrap();
        assert!((shown.left - 42.0).abs() < 1e-9);
        assert!((shown.top - 38.0).abs() < 1e-9);
        assert!((shown.width - 160.0).abs() < 1e-9);
        assert!((shown.height - 90.0).abs() < 1e-9);
    }
}
