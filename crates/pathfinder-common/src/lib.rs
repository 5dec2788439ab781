//! # Pathfinder Common
//!
//! Shared error type, logging configuration and retry utilities for the
//! Habit Pathfinder offline worker crates.

use std::time::Duration;
use thiserror::Error;

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, with_timeout, RetryConfig, Retryable};

/// Error for configuration loading and runtime plumbing.
#[derive(Error, Debug)]
pub enum PathfinderError {
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON input.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl PathfinderError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

pub type Result<T> = std::result::Result<T, PathfinderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_keeps_source() {
        use std::error::Error as _;

        let err = PathfinderError::config_with_source(
            "bad origin",
            std::io::Error::other("inner"),
        );
        assert_eq!(err.to_string(), "Config error: bad origin");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_json_error_from() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: PathfinderError = parse.unwrap_err().into();
        assert!(matches!(err, PathfinderError::Json(_)));
    }
}
