//! Loaded source handle and its metadata.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snipframe_common::error::{SnipError, SnipResult};

/// Duration and native pixel size of a loaded source.
///
/// Delivered once by the metadata-ready callback and immutable afterwards;
/// loading another source replaces it wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration_secs: f64,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl VideoMetadata {
    /// Validate and build metadata.
    pub fn new(duration_secs: f64, pixel_width: u32, pixel_height: u32) -> SnipResult<Self> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(SnipError::precondition(format!(
                "source duration must be positive, got {duration_secs}"
            )));
        }
        if pixel_width == 0 || pixel_height == 0 {
            return Err(SnipError::precondition(format!(
                "source dimensions must be non-zero, got {pixel_width}x{pixel_height}"
            )));
        }
        Ok(Self {
            duration_secs,
            pixel_width,
            pixel_height,
        })
    }

    /// Native dimensions as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.pixel_width, self.pixel_height)
    }
}

/// Handle to the loaded source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Display name, usually the file name.
    pub name: String,

    /// Location on disk, when the source came from the file system.
    pub path: Option<PathBuf>,
}

impl SourceFile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        Self {
            name,
            path: Some(path.to_path_buf()),
        }
    }

    /// File name without its extension; falls back to `"video"`.
    pub fn stem(&self) -> &str {
        let stem = match self.name.rsplit_once('.') {
            Some((stem, _)) => stem,
            None => &self.name,
        };
        if stem.trim().is_empty() {
            "video"
        } else {
            stem
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_validation() {
        assert!(VideoMetadata::new(10.0, 640, 360).is_ok());
        assert!(VideoMetadata::new(0.0, 640, 360).is_err());
        assert!(VideoMetadata::new(f64::NAN, 640, 360).is_err());
        assert!(VideoMetadata::new(10.0, 0, 360).is_err());
    }

    #[test]
    fn test_source_stem() {
        assert_eq!(SourceFile::named("holiday.final.mp4").stem(), "holiday.final");
        assert_eq!(SourceFile::named("clip").stem(), "clip");
        assert_eq!(SourceFile::named(".mp4").stem(), "video");
        assert_eq!(SourceFile::from_path("/tmp/a/b.mov").name, "b.mov");
    }
}
