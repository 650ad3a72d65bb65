//! Error types for the Tessera library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`TesseraError`] enum. Corruption, lock contention and unknown codecs each
//! have a dedicated variant so callers can decide how to react (fail the
//! segment open, retry the lock, ...).
//!
//! # Examples
//!
//! ```
//! use tessera::error::{Result, TesseraError};
//!
//! fn open_segment() -> Result<()> {
//!     Err(TesseraError::corrupt("_0.si", "footer checksum mismatch"))
//! }
//!
//! match open_segment() {
//!     Err(TesseraError::CorruptIndex { resource, .. }) => assert_eq!(resource, "_0.si"),
//!     _ => unreachable!(),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    /// I/O errors, including writes that exceed the storage capacity.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A file failed its integrity checks: checksum mismatch, truncation,
    /// trailing bytes, or a malformed header/footer.
    #[error("Corrupt index ({resource}): {message}")]
    CorruptIndex {
        /// The file (or slice description) that failed.
        resource: String,
        /// What was wrong with it.
        message: String,
    },

    /// The write lock is already held by someone else.
    #[error("Lock held: {0}")]
    LockHeld(String),

    /// Segment metadata references a codec that is not registered.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Segment metadata references a postings or doc values format that is
    /// not registered.
    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    /// Storage-related errors (missing files, closed storage, ...).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid argument or configuration.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not permitted in the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// JSON serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for operations that may fail with [`TesseraError`].
pub type Result<T> = std::result::Result<T, TesseraError>;

impl TesseraError {
    /// Create a new corruption error for the given resource.
    pub fn corrupt<R: Into<String>, S: Into<String>>(resource: R, msg: S) -> Self {
        TesseraError::CorruptIndex {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a new lock-held error.
    pub fn lock_held<S: Into<String>>(name: S) -> Self {
        TesseraError::LockHeld(name.into())
    }

    /// Create a new unsupported codec error.
    pub fn unsupported_codec<S: Into<String>>(name: S) -> Self {
        TesseraError::UnsupportedCodec(name.into())
    }

    /// Create a new unknown format error.
    pub fn unknown_format<S: Into<String>>(name: S) -> Self {
        TesseraError::UnknownFormat(name.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        TesseraError::Storage(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidArgument(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidOperation(msg.into())
    }

    /// Whether this error signals on-disk corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, TesseraError::CorruptIndex { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = TesseraError::corrupt("_0.doc", "checksum failed");
        assert_eq!(
            error.to_string(),
            "Corrupt index (_0.doc): checksum failed"
        );
        assert!(error.is_corruption());

        let error = TesseraError::lock_held("write.lock");
        assert_eq!(error.to_string(), "Lock held: write.lock");
        assert!(!error.is_corruption());

        let error = TesseraError::unsupported_codec("Lucene40");
        assert_eq!(error.to_string(), "Unsupported codec: Lucene40");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = TesseraError::from(io_error);

        match error {
            TesseraError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }
}
