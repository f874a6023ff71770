//! Error types for entropy measurement and free-block scanning

use crate::algorithm::Algorithm;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, EntropyError>;

/// Errors produced by the statistical engine, the free-block iterator and
/// the adapters feeding them
#[derive(Error, Debug)]
pub enum EntropyError {
    /// Malformed value, bad bin size, buffer/block-size mismatch
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Iterator exhausted, or an address beyond the device capacity
    #[error("Out of range: no further blocks available")]
    OutOfRange,

    /// Adapter open/seek/read failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Non-finite statistical result (chiefly an empty measurement window)
    #[error("Floating point error while computing {algorithm}")]
    FloatingPoint { algorithm: Algorithm },

    /// Unsupported algorithm selector
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Allocation failure while building a batch request
    #[error("Out of memory: cannot allocate {0} batch entries")]
    OutOfMemory(usize),

    /// Report serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EntropyError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EntropyError::InvalidArgument(msg.into())
    }

    /// True when the error only signals the end of a free-block scan
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, EntropyError::OutOfRange)
    }
}
