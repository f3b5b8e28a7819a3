//! Error types shared across SnipFrame crates.

use std::path::PathBuf;

/// Top-level error type for SnipFrame operations.
#[derive(Debug, thiserror::Error)]
pub enum SnipError {
    /// Export inputs are invalid; nothing was started.
    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    /// A seek, recorder, playback, or surface failure aborted a run.
    #[error("Export failed: {message}")]
    Runtime { message: String },

    /// The recorder stopped without emitting any data.
    #[error("Export produced no data")]
    EmptyResult,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SnipError.
pub type SnipResult<T> = Result<T, SnipError>;

/// Coarse classification used for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected up front; the user can fix inputs and retry.
    Precondition,
    /// An export run was aborted and moved to the error state.
    Runtime,
}

impl SnipError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition {
            message: msg.into(),
        }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Classify the error. Empty results are reported exactly like runtime
    /// failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Precondition { .. } | Self::Unsupported { .. } | Self::Config { .. } => {
                ErrorKind::Precondition
            }
            _ => ErrorKind::Runtime,
        }
    }

    pub fn is_precondition(&self) -> bool {
        self.kind() == ErrorKind::Precondition
    }

    pub fn is_runtime(&self) -> bool {
        self.kind() == ErrorKind::Runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_classified_as_runtime() {
        assert!(SnipError::EmptyResult.is_runtime());
        assert!(SnipError::runtime("seek failed").is_runtime());
    }

    #[test]
    fn test_precondition_classification() {
        let err = SnipError::precondition("trim end must be after start");
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(err.to_string().contains("trim end must be after start"));
        assert!(SnipError::unsupported("no recorder").is_precondition());
    }
}
