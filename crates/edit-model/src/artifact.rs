//! The exported clip handed back to the user.

use std::path::Path;
use std::sync::Arc;

use snipframe_common::error::SnipResult;

use crate::media::SourceFile;

/// Result of one successful export run.
///
/// The byte buffer is shared, so clones are cheap; it is released when the
/// last clone is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    bytes: Arc<[u8]>,
    mime_type: String,
    suggested_file_name: String,
}

impl OutputArtifact {
    pub fn new(
        bytes: impl Into<Arc<[u8]>>,
        mime_type: impl Into<String>,
        suggested_file_name: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            suggested_file_name: suggested_file_name.into(),
        }
    }

    /// Join recorder chunks into one buffer.
    pub fn from_chunks(
        chunks: &[Vec<u8>],
        mime_type: impl Into<String>,
        suggested_file_name: impl Into<String>,
    ) -> Self {
        let bytes: Vec<u8> = chunks.concat();
        Self::new(bytes, mime_type, suggested_file_name)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn suggested_file_name(&self) -> &str {
        &self.suggested_file_name
    }

    /// Write the bytes to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> SnipResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, &self.bytes)?;
        tracing::info!(path = %path.display(), bytes = self.len(), "Wrote exported clip");
        Ok(())
    }
}

/// `<stem>_trimmed.<extension>` for the given source.
pub fn suggested_file_name(source: &SourceFile, extension: &str) -> String {
    format!("{}_trimmed.{}", source.stem(), extension.trim_start_matches('.'))
}
