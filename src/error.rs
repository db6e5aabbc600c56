//! Error types for blockwal.

use std::io;
use thiserror::Error;

use crate::segment::SegmentId;

/// Result type alias for log operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for write-ahead log operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// I/O error from file operations.
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid configuration option.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Payload is too large to fit in a segment.
    #[error("Value too large: {size} bytes (max: {max})")]
    ValueTooLarge { size: usize, max: usize },

    /// Staged pending writes would exceed the segment size.
    #[error("Pending writes too large: {size} bytes (max: {max})")]
    PendingSizeTooLarge { size: u64, max: u64 },

    /// A read address references an unknown segment.
    #[error("Segment file {0} not found")]
    SegmentNotFound(SegmentId),

    /// Operation on a closed segment or log.
    #[error("The write-ahead log is closed")]
    Closed,

    /// Data corruption detected: CRC mismatch or truncated chunk.
    #[error("Corruption detected: {0}")]
    Corruption(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a corruption error with the given message.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create an invalid option error.
    pub fn invalid_option<S: Into<String>>(msg: S) -> Self {
        Error::InvalidOption(msg.into())
    }

    /// Check if this error indicates corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}
