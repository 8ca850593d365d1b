//! Result and error types for smart coverage collection.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for coverage operations
pub type CoverageResult<T> = Result<T, CoverageError>;

/// Errors that can occur while collecting or writing per-test coverage
#[derive(Debug, Error)]
pub enum CoverageError {
    /// The profiler channel could not be opened
    #[error("Failed to connect to profiler: {message}")]
    ConnectionFailed {
        /// Error message
        message: String,
    },

    /// A profiler command failed or was rejected
    #[error("Profiler command {method} failed: {message}")]
    Protocol {
        /// Profiler method, e.g. `Profiler.takePreciseCoverage`
        method: String,
        /// Error message
        message: String,
    },

    /// The profiler channel closed while a request was in flight
    #[error("Profiler channel closed during {method}")]
    ChannelClosed {
        /// Profiler method that was waiting for a reply
        method: String,
    },

    /// Operation called in the wrong collector/reporter state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// Coverage artifact could not be written
    #[error("Failed to write coverage map to {}: {source}", path.display())]
    OutputWrite {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoverageError {
    /// Create a connection error
    #[must_use]
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Create a protocol error for a profiler method
    #[must_use]
    pub fn protocol(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create a channel-closed error
    #[must_use]
    pub fn channel_closed(method: impl Into<String>) -> Self {
        Self::ChannelClosed {
            method: method.into(),
        }
    }

    /// Create an invalid state error
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an output write error
    #[must_use]
    pub fn output_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputWrite {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_names_method() {
        let err = CoverageError::protocol("Profiler.enable", "not attached");
        let message = err.to_string();
        assert!(message.contains("Profiler.enable"));
        assert!(message.contains("not attached"));
    }

    #[test]
    fn test_channel_closed_error() {
        let err = CoverageError::channel_closed("Profiler.takePreciseCoverage");
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_output_write_error_includes_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CoverageError::output_write("/tmp/out/coverage.json", io);
        assert!(err.to_string().contains("/tmp/out/coverage.json"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CoverageError = io.into();
        assert!(matches!(err, CoverageError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CoverageError = json_err.into();
        assert!(err.to_string().starts_with("JSON error"));
    }
}
