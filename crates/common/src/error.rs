//! Error types shared across Reelcraft crates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level error type for Reelcraft operations.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("No usable encoder: {message}")]
    EncoderUnavailable { message: String },

    #[error("Capture failed while recording: {message}")]
    RuntimeCapture { message: String },

    #[error("Media load error: {message}")]
    MediaLoad { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelError.
pub type ReelResult<T> = Result<T, ReelError>;

/// Coarse classification used when errors are delivered as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    EncoderUnavailable,
    RuntimeCapture,
    MediaLoad,
    Internal,
}

impl ReelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn encoder_unavailable(msg: impl Into<String>) -> Self {
        Self::EncoderUnavailable {
            message: msg.into(),
        }
    }

    pub fn runtime_capture(msg: impl Into<String>) -> Self {
        Self::RuntimeCapture {
            message: msg.into(),
        }
    }

    pub fn media_load(msg: impl Into<String>) -> Self {
        Self::MediaLoad {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    /// Classify this error for the event channel.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation { .. } => ErrorClass::Validation,
            Self::EncoderUnavailable { .. } => ErrorClass::EncoderUnavailable,
            Self::RuntimeCapture { .. } => ErrorClass::RuntimeCapture,
            Self::MediaLoad { .. } | Self::FileNotFound { .. } => ErrorClass::MediaLoad,
            _ => ErrorClass::Internal,
        }
    }

    /// Whether this error ends an export run (as opposed to an item-local problem).
    pub fn is_pipeline_fatal(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::EncoderUnavailable | ErrorClass::RuntimeCapture
        )
    }
}

impl From<image::ImageError> for ReelError {
    fn from(err: image::ImageError) -> Self {
        Self::MediaLoad {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(ReelError::validation("x").class(), ErrorClass::Validation);
        assert_eq!(
            ReelError::encoder_unavailable("x").class(),
            ErrorClass::EncoderUnavailable
        );
        assert_eq!(
            ReelError::FileNotFound {
                path: PathBuf::from("missing.png")
            }
            .class(),
            ErrorClass::MediaLoad
        );
        assert_eq!(ReelError::render("x").class(), ErrorClass::Internal);
    }

    #[test]
    fn test_pipeline_fatal_only_for_export_errors() {
        assert!(ReelError::runtime_capture("track ended").is_pipeline_fatal());
        assert!(ReelError::encoder_unavailable("none").is_pipeline_fatal());
        assert!(!ReelError::media_load("timeout").is_pipeline_fatal());
        assert!(!ReelError::validation("empty").is_pipeline_fatal());
    }

    #[test]
    fn test_display_includes_message() {
        let err = ReelError::validation("trim start must be before end");
        assert_eq!(
            err.to_string(),
            "Validation error: trim start must be before end"
        );
    }
}
