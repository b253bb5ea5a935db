//! Error handling module for rsync-share
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Library code returns these; the binary wraps them with anyhow context.

use thiserror::Error;

/// Main error type for rsync-share
#[derive(Error, Debug)]
pub enum ShareError {
    /// IO errors (authorized_keys, image files, sockets)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Size string could not be parsed or is out of range
    #[error("Invalid share size: {0}")]
    InvalidSize(String),

    /// Public key string is malformed
    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    /// Share name is not usable as a file name
    #[error("Invalid share name: {0}")]
    InvalidName(String),

    /// Configuration errors (loading, validation, conflicting state)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Disk image or partition table errors
    #[error("Disk image error: {0}")]
    Image(String),

    /// Filesystem creation/inspection errors
    #[error("Filesystem error: {0}")]
    Filesystem(String),
}

/// Result type alias for rsync-share operations
pub type Result<T> = std::result::Result<T, ShareError>;

// Convenient error constructors
impl ShareError {
    /// Create an invalid size error
    pub fn invalid_size(msg: impl Into<String>) -> Self {
        Self::InvalidSize(msg.into())
    }

    /// Create an invalid key error
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create an invalid share name error
    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::InvalidName(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a disk image error
    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image(msg.into())
    }

    /// Create a filesystem error
    pub fn filesystem(msg: impl Into<String>) -> Self {
        Self::Filesystem(msg.into())
    }
}
