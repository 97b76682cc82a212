//! Error types for lockstep core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.

use thiserror::Error;

/// Result type alias for lockstep operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for lockstep.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Buffer-related error
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Pipeline-related error
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// A worker thread panicked or could not be spawned
    #[error("Worker error: {0}")]
    Worker(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Keyed ring buffer errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Lookup on a key that is not indexed
    #[error("Key {0} was not found in buffer")]
    NotFound(String),

    /// Ring buffers need at least one slot
    #[error("Buffer capacity must be greater than zero")]
    ZeroCapacity,
}

/// Pipeline protocol errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// More entries were claimed valid than the main buffer can hold
    #[error("Asked to process {valid} records but the buffer holds {capacity}")]
    CapacityExceeded { valid: usize, capacity: usize },

    /// A stage's channel peer went away before the run finished
    #[error("Stage {0} disconnected before reporting a result")]
    Disconnected(String),
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("invalid value".into());
        assert_eq!(err.to_string(), "Configuration error: invalid value");

        let buffer_err = BufferError::NotFound("a".into());
        let err: Error = buffer_err.into();
        assert_eq!(err.to_string(), "Buffer error: Key a was not found in buffer");
    }

    #[test]
    fn test_capacity_exceeded() {
        let err = PipelineError::CapacityExceeded {
            valid: 11,
            capacity: 10,
        };
        assert_eq!(
            err.to_string(),
            "Asked to process 11 records but the buffer holds 10"
        );
    }

    #[test]
    fn test_serde_json_conversion() {
        let parse_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
