//! Error types for the buffer engine.

use thiserror::Error;

/// Errors produced by the buffer engine's public operations.
#[derive(Debug, Error)]
pub enum BufferError {
    /// The configured memory ceiling prevented a chunk from growing to fit
    /// the next append.
    #[error("buffer full: pool exhausted while growing chunk for tag {tag:?}")]
    BufferFull {
        /// Tag whose chunk could not grow.
        tag: String,
    },

    /// Transporter or file-system I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker was interrupted while performing a blocking enqueue or
    /// draining the flush queue.
    #[error("operation cancelled")]
    Cancelled,

    /// A caller-supplied argument was malformed, e.g. a backup filename
    /// decoded to the wrong number of params.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, BufferError>;
