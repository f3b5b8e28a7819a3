//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{SnipError, SnipResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where exported clips land when no output path is given.
    pub output_dir: PathBuf,

    /// Export pipeline tuning.
    #[serde(default)]
    pub export: ExportDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Capture stream frame rate.
    pub fps: u32,

    /// Display refresh rate driving the draw loop when no host ticker is supplied.
    pub refresh_hz: u32,

    /// Positions closer than this to the trim start skip the explicit seek.
    pub seek_tolerance_secs: f64,

    /// Crop rectangles must exceed this size on both axes to be committed.
    pub min_crop_px: u32,

    /// Extra wall-clock time past the trim length before the safety timeout fires.
    pub stop_grace_secs: f64,

    /// Maximum progress callback rate.
    pub progress_hz: u32,

    /// Output encodings in order of preference.
    pub codec_preferences: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "snipframe=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            export: ExportDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            refresh_hz: 60,
            seek_tolerance_secs: 0.05,
            min_crop_px: 4,
            stop_grace_secs: 0.25,
            progress_hz: 4,
            codec_preferences: vec![
                "video/webm;codecs=vp9,opus".to_string(),
                "video/webm;codecs=vp8,opus".to_string(),
                "video/webm".to_string(),
            ],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl ExportDefaults {
    /// Reject values the export loop cannot work with.
    pub fn validate(&self) -> SnipResult<()> {
        if self.fps == 0 || self.refresh_hz == 0 {
            return Err(SnipError::config("fps and refresh_hz must be non-zero"));
        }
        if !self.seek_tolerance_secs.is_finite() || self.seek_tolerance_secs < 0.0 {
            return Err(SnipError::config("seek_tolerance_secs must be >= 0"));
        }
        if !self.stop_grace_secs.is_finite() || self.stop_grace_secs < 0.0 {
            return Err(SnipError::config("stop_grace_secs must be >= 0"));
        }
        Ok(())
    }

    /// Seconds between two captured frames.
    pub fn frame_interval_secs(&self) -> f64 {
        1.0 / self.fps.max(1) as f64
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
                    Ok(config) => match config.export.validate() {
                        Ok(()) => return config,
                        Err(e) => {
                            tracing::warn!("Ignoring invalid config at {:?}: {}", config_path, e);
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("snipframe").join("config.json")
}

/// Default export directory.
fn default_output_dir() -> PathBuf {
    let base = std::env::var("XDG_VIDEOS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join("Videos")
        });
    base.join("snipframe")
}
