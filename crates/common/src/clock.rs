//! Clock and timing utilities for export runs.
//!
//! An export run is anchored to the instant playback starts. This module
//! provides:
//! - The run clock (monotonic, `tokio::time` based so paused-time tests work)
//! - Drift between the wall clock and the source's playback clock
//! - Rate limiting for progress reports

use tokio::time::Instant;

/// Monotonic clock for one export run, anchored at playback start.
#[derive(Debug, Clone)]
pub struct RunClock {
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339), for logs only.
    epoch_wall: String,
}

impl RunClock {
    /// Create a new run clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since the run clock started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Nanoseconds elapsed since the run clock started.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// Drift between how far the source actually played and how much wall-clock
/// time passed while capturing it.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Wall-clock seconds since playback start.
    pub wall_secs: f64,
    /// Playback seconds advanced since playback start.
    pub playback_secs: f64,
}

impl DriftMeasurement {
    /// Drift in milliseconds (positive = playback ran ahead of the wall clock).
    pub fn drift_ms(&self) -> f64 {
        (self.playback_secs - self.wall_secs) * 1000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

/// Limits how often a periodic action fires.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
            last_tick_ns: None,
        }
    }

    /// Returns true (and records the tick) once at least one interval has
    /// passed since the previous tick. The first call always fires.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            Some(last) if current_ns < last + self.target_interval_ns => false,
            _ => {
                self.last_tick_ns = Some(current_ns);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_run_clock_follows_tokio_time() {
        let clock = RunClock::start();
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!((clock.elapsed_secs() - 1.5).abs() < 1e-3);
    }

    #[test]
    fn test_drift_measurement() {
        let drift = DriftMeasurement {
            wall_secs: 3.0,
            playback_secs: 2.95,
        };
        assert!((drift.drift_ms() + 50.0).abs() < 1e-6);
        assert!(drift.exceeds_threshold_ms(10.0));
        assert!(!drift.exceeds_threshold_ms(100.0));
    }

    #[test]
    fn test_rate_controller() {
        let mut ctrl = RateController::new(4);
        assert!(ctrl.should_tick(0));
        assert!(!ctrl.should_tick(100_000_000));
        assert!(ctrl.should_tick(250_000_000));
    }
}
