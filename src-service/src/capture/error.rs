//! Error types for capture operations.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The requested capture target was not found
    #[error("Capture target not found: {0}")]
    TargetNotFound(String),
    /// A delivered surface does not match its declared geometry
    #[error("Malformed surface: {0}")]
    MalformedSurface(String),
    /// Platform-specific capture error
    #[error("Platform error: {0}")]
    PlatformError(String),
}

/// Error type for enumeration operations.
#[derive(Debug, Error)]
pub enum EnumerationError {
    /// Platform-specific enumeration error
    #[error("Platform error: {0}")]
    PlatformError(String),
}

/// Error type for still-image encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Error type for capture session lifecycle operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("capture session is closed")]
    Closed,
    #[error("capture session already started")]
    AlreadyStarted,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}
