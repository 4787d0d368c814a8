use std::io;
use thiserror::Error;

/// Result type alias for patch operations.
pub type Result<T> = std::result::Result<T, PatchError>;

#[derive(Error, Debug)]
pub enum PatchError {
    /// Neither magic matched. Non-fatal: the caller may try the other
    /// stream as the patch instead.
    #[error("not a recognized patch file")]
    FormatUnrecognized,

    /// Truncated or malformed patch container.
    #[error("invalid patch: {0}")]
    Decode(String),

    /// A checksum or size precondition failed before any byte was written.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
