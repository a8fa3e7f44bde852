//! Error types for scadview

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using scadview's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while normalizing parameters or sizing a response
#[derive(Error, Debug)]
pub enum Error {
    /// A parameter had an unsupported shape or value
    #[error("{0}")]
    InvalidParameter(String),

    /// A sequence parameter had the wrong number of elements
    #[error("{what} must have {expected} values, got {got}")]
    Arity {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Output format directive not recognized
    #[error("Unknown output format '{0}'. Valid options: auto, base64, file_path, compressed")]
    UnknownOutputFormat(String),

    /// Encoded image payload was not valid base64
    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Image decoding/encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing an image to disk failed
    #[error("Failed to save image to {}: {source}", path.display())]
    SaveImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether this error was caused by malformed caller input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter(_) | Self::Arity { .. } | Self::UnknownOutputFormat(_)
        )
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}
