//! Error types for Cutline.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Cutline operations.
#[derive(Error, Debug)]
pub enum CutlineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected input (bad trim bounds, out-of-range index or time).
    /// The model is left unmutated.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Media file not found: {}", .0.display())]
    MediaNotFound(PathBuf),

    #[error("Unreadable media format: {0}")]
    UnreadableFormat(String),

    /// Probe, load or seek failure reported by an external collaborator.
    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CutlineError {
    /// Shorthand for a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for errors that were rejected synchronously before any mutation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }

    /// True for failures of external media resources (probe, load, seek).
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            Self::Resource(_) | Self::MediaNotFound(_) | Self::UnreadableFormat(_)
        )
    }
}

/// Result type alias for Cutline operations.
pub type Result<T> = std::result::Result<T, CutlineError>;
