//! Drag-to-select crop rectangle.
//!
//! A drag produces a *provisional* rectangle that follows the pointer; when
//! the drag ends it is either *committed* (large enough) or dropped. Export
//! only ever reads the committed value.

use serde::{Deserialize, Serialize};
use snipframe_common::error::{SnipError, SnipResult};

use crate::geometry::PixelPoint;
use crate::media::VideoMetadata;

/// Default minimum crop size; both sides must exceed it.
pub const DEFAULT_MIN_CROP_PX: u32 = 4;

/// Axis-aligned rectangle in native pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle lies entirely inside a `frame_width x frame_height` frame.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x as u64 + self.width as u64 <= frame_width as u64
            && self.y as u64 + self.height as u64 <= frame_height as u64
    }

    /// Whether both sides are strictly larger than `min_px`.
    pub fn exceeds(&self, min_px: u32) -> bool {
        self.width > min_px && self.height > min_px
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Smallest pixel-aligned rectangle covering the bounding box of two
    /// points, clamped to the frame.
    pub fn spanning(a: PixelPoint, b: PixelPoint, frame_width: u32, frame_height: u32) -> Self {
        let (ax, bx) = (clamp_axis(a.x, frame_width), clamp_axis(b.x, frame_width));
        let (ay, by) = (clamp_axis(a.y, frame_height), clamp_axis(b.y, frame_height));
        let (left, right) = (ax.min(bx).floor(), ax.max(bx).ceil());
        let (top, bottom) = (ay.min(by).floor(), ay.max(by).ceil());
        Self {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        }
    }
}

fn clamp_axis(v: f64, max: u32) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, max as f64)
    } else {
        0.0
    }
}

/// Unsnapped width and height of a drag, inside the frame.
fn drag_extent(a: PixelPoint, b: PixelPoint, frame_width: u32, frame_height: u32) -> (f64, f64) {
    (
        (clamp_axis(a.x, frame_width) - clamp_axis(b.x, frame_width)).abs(),
        (clamp_axis(a.y, frame_height) - clamp_axis(b.y, frame_height)).abs(),
    )
}

/// Pointer buttons as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
    Other(u16),
}

/// Whether a drag is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropPhase {
    NotDrawing,
    Drawing,
}

/// Interactive crop selection state machine.
#[derive(Debug, Clone)]
pub struct CropSelector {
    min_size_px: u32,
    frame: Option<(u32, u32)>,
    phase: CropPhase,
    anchor: Option<PixelPoint>,
    cursor: Option<PixelPoint>,
    provisional: Option<CropRect>,
    committed: Option<CropRect>,
}

impl Default for CropSelector {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CROP_PX)
    }
}

impl CropSelector {
    pub fn new(min_size_px: u32) -> Self {
        Self {
            min_size_px,
            frame: None,
            phase: CropPhase::NotDrawing,
            anchor: None,
            cursor: None,
            provisional: None,
            committed: None,
        }
    }

    pub fn phase(&self) -> CropPhase {
        self.phase
    }

    /// Rectangle currently being dragged, for the overlay.
    pub fn provisional(&self) -> Option<CropRect> {
        self.provisional
    }

    /// Rectangle the export step consumes; `None` means full frame.
    pub fn committed(&self) -> Option<CropRect> {
        self.committed
    }

    pub fn min_size_px(&self) -> u32 {
        self.min_size_px
    }

    /// Clear everything and adopt the frame size of a newly loaded source.
    pub fn reset_for(&mut self, metadata: Option<&VideoMetadata>) {
        self.frame = metadata.map(VideoMetadata::dimensions);
        self.reset();
    }

    /// Start a drag. Ignored unless idle, the primary button is used, and the
    /// frame size is known. Returns whether the event was consumed.
    pub fn begin(&mut self, point: PixelPoint, button: PointerButton) -> bool {
        if self.phase != CropPhase::NotDrawing || button != PointerButton::Primary {
            return false;
        }
        let Some((w, h)) = self.frame else {
            return false;
        };
        self.anchor = Some(point);
        self.cursor = Some(point);
        self.provisional = Some(CropRect::spanning(point, point, w, h));
        self.phase = CropPhase::Drawing;
        true
    }

    /// Track the pointer during a drag. Returns the new provisional rectangle.
    pub fn update(&mut self, point: PixelPoint) -> Option<CropRect> {
        if self.phase != CropPhase::Drawing {
            return None;
        }
        let (anchor, (w, h)) = (self.anchor?, self.frame?);
        let rect = CropRect::spanning(anchor, point, w, h);
        self.cursor = Some(point);
        self.provisional = Some(rect);
        Some(rect)
    }

    /// Finish a drag, committing the provisional rectangle if the drag itself
    /// (before pixel snapping) was larger than the minimum on both axes.
    /// Returns the committed value.
    pub fn end(&mut self) -> Option<CropRect> {
        if self.phase != CropPhase::Drawing {
            return self.committed;
        }
        self.phase = CropPhase::NotDrawing;
        let min = self.min_size_px as f64;
        let large_enough = match (self.anchor.take(), self.cursor.take(), self.frame) {
            (Some(anchor), Some(cursor), Some((w, h))) => {
                let (dx, dy) = drag_extent(anchor, cursor, w, h);
                dx > min && dy > min
            }
            _ => false,
        };
        self.committed = self.provisional.take().filter(|_| large_enough);
        match self.committed {
            Some(rect) => tracing::debug!(?rect, "Crop committed"),
            None => tracing::debug!("Crop selection too small; cleared"),
        }
        self.committed
    }

    /// Drop provisional and committed rectangles and stop any drag.
    pub fn reset(&mut self) {
        self.phase = CropPhase::NotDrawing;
        self.anchor = None;
        self.cursor = None;
        self.provisional = None;
        self.committed = None;
    }

    /// Commit a rectangle typed in numerically.
    ///
    /// Rectangles outside the frame are rejected; ones at or below the minimum
    /// size commit "no crop", exactly like a tiny drag.
    pub fn commit_exact(&mut self, rect: CropRect) -> SnipResult<Option<CropRect>> {
        let (w, h) = self
            .frame
            .ok_or_else(|| SnipError::precondition("crop requires known video dimensions"))?;
        if !rect.fits_within(w, h) {
            return Err(SnipError::precondition(format!(
                "crop {}x{}+{}+{} does not fit inside {w}x{h}",
                rect.width, rect.height, rect.x, rect.y
            )));
        }
        self.reset();
        self.committed = Some(rect).filter(|r| r.exceeds(self.min_size_px));
        Ok(self.committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn selector() -> CropSelector {
        let mut s = CropSelector::default();
        s.reset_for(Some(&VideoMetadata::new(10.0, 640, 360).unwrap()));
        s
    }

    fn p(x: f64, y: f64) -> PixelPoint {
        PixelPoint::new(x, y)
    }

    #[test]
    fn test_drag_commits_bounding_box() {
        let mut s = selector();
        assert!(s.begin(p(110.0, 60.0), PointerButton::Primary));
        assert_eq!(s.phase(), CropPhase::Drawing);
        assert_eq!(s.provisional(), Some(CropRect::new(110, 60, 0, 0)));

        s.update(p(10.0, 10.0));
        assert_eq!(s.committed(), None);
        assert_eq!(s.end(), Some(CropRect::new(10, 10, 100, 50)));
        assert_eq!(s.phase(), CropPhase::NotDrawing);
        assert_eq!(s.provisional(), None);
    }

    #[test]
    fn test_small_drag_collapses_to_no_crop() {
        let mut s = selector();
        s.begin(p(10.0, 10.0), PointerButton::Primary);
        s.update(p(14.0, 200.0));
        assert_eq!(s.end(), None);

        s.begin(p(10.0, 10.0), PointerButton::Primary);
        s.update(p(15.0, 15.0));
        assert_eq!(s.end(), Some(CropRect::new(10, 10, 5, 5)));
    }

    #[test]
    fn test_threshold_uses_unsnapped_drag_size() {
        let mut s = selector();
        // 4.8 px on both axes: larger than the minimum before snapping.
        s.begin(p(10.6, 10.6), PointerButton::Primary);
        assert_eq!(s.update(p(15.4, 15.4)), Some(CropRect::new(10, 10, 6, 6)));
        assert_eq!(s.end(), Some(CropRect::new(10, 10, 6, 6)));

        // 3.9 px covers five pixels but is still too small.
        s.begin(p(10.6, 10.6), PointerButton::Primary);
        s.update(p(14.5, 14.5));
        assert_eq!(s.end(), None);
    }

    #[test]
    fn test_non_primary_button_ignored() {
        let mut s = selector();
        assert!(!s.begin(p(1.0, 1.0), PointerButton::Secondary));
        assert_eq!(s.phase(), CropPhase::NotDrawing);
        assert!(s.update(p(50.0, 50.0)).is_none());
    }

    #[test]
    fn test_begin_ignored_while_drawing_or_without_frame() {
        let mut s = selector();
        assert!(s.begin(p(1.0, 1.0), PointerButton::Primary));
        assert!(!s.begin(p(5.0, 5.0), PointerButton::Primary));

        let mut unloaded = CropSelector::default();
        assert!(!unloaded.begin(p(1.0, 1.0), PointerButton::Primary));
    }

    #[test]
    fn test_reset_clears_committed() {
        let mut s = selector();
        s.begin(p(0.0, 0.0), PointerButton::Primary);
        s.update(p(100.0, 100.0));
        s.end();
        assert!(s.committed().is_some());
        s.reset();
        assert!(s.committed().is_none());
        assert_eq!(s.phase(), CropPhase::NotDrawing);
    }

    #[test]
    fn test_commit_exact() {
        let mut s = selector();
        assert_eq!(
            s.commit_exact(CropRect::new(10, 10, 100, 50)).unwrap(),
            Some(CropRect::new(10, 10, 100, 50))
        );
        assert_eq!(s.commit_exact(CropRect::new(0, 0, 3, 300)).unwrap(), None);
        assert!(s.commit_exact(CropRect::new(600, 0, 100, 50)).is_err());
    }

    proptest! {
        #[test]
        fn prop_committed_rect_respects_frame(
            points in proptest::collection::vec((-100.0f64..800.0, -100.0f64..500.0), 1..12)
        ) {
            let mut s = selector();
            let (x0, y0) = points[0];
            s.begin(p(x0, y0), PointerButton::Primary);
            for &(x, y) in &points[1..] {
                let rect = s.update(p(x, y)).unwrap();
                prop_assert!(rect.fits_within(640, 360));
            }
            if let Some(rect) = s.end() {
                prop_assert!(rect.fits_within(640, 360));
                prop_assert!(rect.width > 4 && rect.height > 4);
            }
        }

        #[test]
        fn prop_update_is_idempotent(x in 0.0f64..640.0, y in 0.0f64..360.0) {
            let mut s = selector();
            s.begin(p(320.0, 180.0), PointerButton::Primary);
            let first = s.update(p(x, y));
            let second = s.update(p(x, y));
            prop_assert_eq!(first, second);
        }
    }
}
