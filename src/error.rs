//! Error types for jsoc-dl
//!
//! This module provides the error taxonomy of the export client:
//! - Transport failures (connection errors and non-2xx HTTP responses)
//! - Caller mistakes caught before any network call (invalid options, bad time ranges)
//! - Local I/O and decoding failures during file transfer

use crate::types::ExportHandle;
use thiserror::Error;

/// Result type alias for jsoc-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for jsoc-dl
///
/// Each variant carries enough context to tell which request or setting failed.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP transport failed: connection error or non-success status code
    ///
    /// Never retried for export submission or status checks.
    #[error("transport error for {url}: {message}")]
    Transport {
        /// URL of the failed request
        url: String,
        /// HTTP status code, if a response was received
        status: Option<u16>,
        /// Human-readable description of the failure
        message: String,
    },

    /// Unsupported option combination, raised before any network call
    #[error("invalid option '{option}': {message}")]
    InvalidOption {
        /// Name of the offending option (e.g., "wavelength")
        option: String,
        /// Why the option was rejected
        message: String,
    },

    /// Time range with start after end
    #[error("invalid time range: start {start} is after end {end}")]
    InvalidTimeRange {
        /// Formatted start time
        start: String,
        /// Formatted end time
        end: String,
    },

    /// Time string that could not be parsed
    #[error("invalid time '{0}'")]
    InvalidTime(String),

    /// The wait loop ran out of poll passes before every request was staged
    #[error("gave up waiting after {passes} poll passes, {} request(s) still pending", pending.len())]
    PollLimitExceeded {
        /// Number of full passes performed
        passes: u32,
        /// Handles that never reached a terminal state
        pending: Vec<ExportHandle>,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_connections")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response body could not be decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL could not be built from the archive's directory and filename
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Build a transport error from a reqwest failure
    pub(crate) fn transport(url: &str, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };
        Error::Transport {
            url: url.to_string(),
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// Build a transport error from a non-success HTTP status
    pub(crate) fn http_status(url: &str, status: reqwest::StatusCode) -> Self {
        Error::Transport {
            url: url.to_string(),
            status: Some(status.as_u16()),
            message: format!("HTTP status {}", status),
        }
    }

    /// Build an invalid-option error
    pub(crate) fn invalid_option(option: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidOption {
            option: option.into(),
            message: message.into(),
        }
    }

    /// Build a configuration error for a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
