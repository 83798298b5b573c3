//! Error types for blockkv
//!
//! Provides a unified error type for all operations, plus the mapping
//! between engine errors and the signed result codes carried in response
//! payloads.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for blockkv operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt store: {0}")]
    CorruptStore(String),

    #[error("Out of space")]
    OutOfSpace,

    #[error("Key not found")]
    NotFound,

    #[error("Buffer too small: {required} bytes required")]
    BufferTooSmall { required: usize },

    #[error("Key directory full")]
    DirectoryFull,

    #[error("Key too long")]
    KeyTooLong,

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),
}

// =============================================================================
// Wire Result Codes
// =============================================================================
//
// Response payloads carry a signed result: 0 = success, negative = error.
// Engine errors always surface this way; ERROR frames are reserved for
// requests that failed to decode.

impl StoreError {
    /// The signed result code for this error on the wire
    pub fn result_code(&self) -> i32 {
        match self {
            StoreError::NotFound => -1,
            StoreError::OutOfSpace => -2,
            StoreError::DirectoryFull => -3,
            StoreError::KeyTooLong => -4,
            StoreError::BufferTooSmall { .. } => -5,
            StoreError::Io(_) => -6,
            StoreError::CorruptStore(_) => -7,
            StoreError::Protocol(_) => -8,
        }
    }

    /// Reconstruct an error from a non-zero wire result code
    ///
    /// Detail lost in transit (IO causes, required buffer sizes) is not
    /// recoverable; callers that have it from elsewhere in the payload
    /// should prefer their own mapping.
    pub fn from_result_code(code: i32) -> Self {
        match code {
            -1 => StoreError::NotFound,
            -2 => StoreError::OutOfSpace,
            -3 => StoreError::DirectoryFull,
            -4 => StoreError::KeyTooLong,
            -5 => StoreError::BufferTooSmall { required: 0 },
            -6 => StoreError::Io(std::io::Error::other("remote IO error")),
            -7 => StoreError::CorruptStore("remote store corrupt".to_string()),
            _ => StoreError::Protocol(format!("unknown result code: {}", code)),
        }
    }
}
