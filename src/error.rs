//! Error types for logcask
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using CaskError
pub type Result<T> = std::result::Result<T, CaskError>;

/// Unified error type for logcask operations
#[derive(Debug, Error)]
pub enum CaskError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// The record at the indexed location belongs to a different key whose
    /// fingerprint collides with the requested one.
    #[error("Fingerprint collision: stored record belongs to a different key")]
    KeyMismatch,

    // -------------------------------------------------------------------------
    // Lookup Outcomes
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Key has expired")]
    KeyExpired,

    // -------------------------------------------------------------------------
    // Startup Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data directory holds {total} bytes, at or above the {limit} byte limit")]
    Capacity { total: u64, limit: u64 },

    #[error("Recovery failed: {0}")]
    Recovery(String),

    // -------------------------------------------------------------------------
    // Request Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl CaskError {
    /// Whether this error is an expected lookup miss rather than a failure
    pub fn is_miss(&self) -> bool {
        matches!(self, CaskError::KeyNotFound | CaskError::KeyExpired)
    }
}
