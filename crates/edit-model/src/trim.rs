//! Trim interval management.

use serde::{Deserialize, Serialize};

use crate::media::VideoMetadata;

/// Inclusive time interval to keep, in seconds.
///
/// Invariant (maintained by [`TrimRangeController`]):
/// `0 <= start <= end <= duration`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

impl TrimRange {
    pub const EMPTY: TrimRange = TrimRange {
        start: 0.0,
        end: 0.0,
    };

    /// Length of the interval in seconds.
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// Whether the interval has positive length.
    pub fn is_exportable(&self) -> bool {
        self.end > self.start
    }
}

impl Default for TrimRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Owns the trim interval and keeps it ordered and inside the source.
#[derive(Debug, Clone, Default)]
pub struct TrimRangeController {
    duration_secs: f64,
    range: TrimRange,
}

impl TrimRangeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controller spanning the whole source.
    pub fn for_metadata(metadata: &VideoMetadata) -> Self {
        let mut controller = Self::new();
        controller.reset_for(metadata);
        controller
    }

    pub fn range(&self) -> TrimRange {
        self.range
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn length(&self) -> f64 {
        self.range.length()
    }

    /// Collapse to `[0, 0]` while no metadata is known.
    pub fn clear(&mut self) {
        self.duration_secs = 0.0;
        self.range = TrimRange::EMPTY;
    }

    /// Span the full source once metadata arrives.
    pub fn reset_for(&mut self, metadata: &VideoMetadata) {
        self.duration_secs = metadata.duration_secs.max(0.0);
        self.range = TrimRange {
            start: 0.0,
            end: self.duration_secs,
        };
    }

    /// Move the start; never past the current end.
    pub fn set_start(&mut self, value: f64) -> TrimRange {
        if let Some(v) = self.clamp_to_source(value) {
            self.range.start = v.min(self.range.end);
        }
        self.range
    }

    /// Move the end; never before the current start.
    pub fn set_end(&mut self, value: f64) -> TrimRange {
        if let Some(v) = self.clamp_to_source(value) {
            self.range.end = v.max(self.range.start);
        }
        self.range
    }

    /// Use the current playback position as the start.
    pub fn use_current_as_start(&mut self, position_secs: f64) -> TrimRange {
        self.set_start(position_secs)
    }

    /// Use the current playback position as the end.
    pub fn use_current_as_end(&mut self, position_secs: f64) -> TrimRange {
        self.set_end(position_secs)
    }

    // Non-finite input (NaN from an empty number field) leaves the range alone.
    fn clamp_to_source(&self, value: f64) -> Option<f64> {
        if value.is_nan() {
            return None;
        }
        Some(value.clamp(0.0, self.duration_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn controller() -> TrimRangeController {
        TrimRangeController::for_metadata(&VideoMetadata::new(10.0, 640, 360).unwrap())
    }

    #[test]
    fn test_reset_spans_source() {
        let c = controller();
        assert_eq!(c.range(), TrimRange { start: 0.0, end: 10.0 });
    }

    #[test]
    fn test_start_cannot_pass_end() {
        let mut c = controller();
        c.set_end(4.0);
        assert_eq!(c.set_start(7.0), TrimRange { start: 4.0, end: 4.0 });
    }

    #[test]
    fn test_end_cannot_precede_start() {
        let mut c = controller();
        c.set_start(6.0);
        assert_eq!(c.set_end(2.0), TrimRange { start: 6.0, end: 6.0 });
    }

    #[test]
    fn test_values_clamped_to_duration() {
        let mut c = controller();
        c.set_start(-3.0);
        c.set_end(99.0);
        assert_eq!(c.range(), TrimRange { start: 0.0, end: 10.0 });
        c.set_end(f64::INFINITY);
        assert_eq!(c.range().end, 10.0);
        c.set_start(f64::NAN);
        assert_eq!(c.range().start, 0.0);
    }

    #[test]
    fn test_use_current_position() {
        let mut c = controller();
        c.use_current_as_start(1.0);
        c.use_current_as_end(4.0);
        assert!((c.length() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_clear_before_metadata() {
        let mut c = controller();
        c.clear();
        assert_eq!(c.range(), TrimRange::EMPTY);
        assert_eq!(c.set_end(5.0), TrimRange::EMPTY);
        assert!(!c.range().is_exportable());
    }

    #[derive(Debug, Clone)]
    enum Edit {
        Start(f64),
        End(f64),
    }

    fn edit() -> impl Strategy<Value = Edit> {
        let value = prop_oneof![
            any::<f64>(),
            -20.0f64..30.0,
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
        ];
        (any::<bool>(), value).prop_map(|(is_start, v)| {
            if is_start {
                Edit::Start(v)
            } else {
                Edit::End(v)
            }
        })
    }

    proptest! {
        #[test]
        fn prop_range_stays_ordered_and_bounded(
            duration in 0.1f64..1000.0,
            edits in proptest::collection::vec(edit(), 0..40),
        ) {
            let meta = VideoMetadata::new(duration, 640, 360).unwrap();
            let mut c = TrimRangeController::for_metadata(&meta);
            for e in edits {
                let r = match e {
                    Edit::Start(v) => c.set_start(v),
                    Edit::End(v) => c.set_end(v),
                };
                prop_assert!(0.0 <= r.start);
                prop_assert!(r.start <= r.end);
                prop_assert!(r.end <= duration);
            }
        }
    }
}
