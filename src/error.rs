//! Error types for usenet-speedtest
//!
//! Errors fall into three groups:
//! - Setup errors (connect, authenticate, group selection, overview, pool start)
//!   abort the whole run and surface from [`Speedtest::run`](crate::Speedtest::run)
//! - Per-article fetch errors are logged and counted by the worker that hit them
//! - Shutdown errors are logged and never escalated

use std::time::Duration;
use thiserror::Error;

/// Result type alias for usenet-speedtest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for usenet-speedtest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "benchmark.connections")
        key: Option<String>,
    },

    /// TCP connection to the server could not be established
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// The `host:port` that was dialed
        address: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// An operation did not complete within its configured timeout
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being waited on (e.g., "connect", "ARTICLE response")
        operation: String,
        /// The timeout that elapsed
        after: Duration,
    },

    /// Authentication was rejected by the server
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Server answered a command with an unexpected status code
    #[error("NNTP error {code}: {message}")]
    Nntp {
        /// Three digit NNTP status code
        code: u16,
        /// Remainder of the status line
        message: String,
    },

    /// Server response could not be parsed
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The selected group holds no articles
    #[error("group {0} is empty")]
    EmptyGroup(String),

    /// The requested span runs past the last article and clamping is disabled
    #[error("requested range ends at {end} but the group's last article is {high}")]
    RangeExceedsGroup {
        /// Requested last article number
        end: u64,
        /// Highest article number in the group
        high: u64,
    },

    /// A pool connection failed to come up
    #[error("connection {index} failed to start: {source}")]
    PoolStart {
        /// Zero-based worker index that failed
        index: usize,
        /// Why the session could not be established
        #[source]
        source: Box<Error>,
    },

    /// Every pool connection failed to come up
    #[error("none of the {requested} requested connections could be established")]
    NoLiveConnections {
        /// Number of connections requested
        requested: usize,
    },

    /// The work queue has no remaining consumers
    #[error("work queue closed: no workers are receiving")]
    QueueClosed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Build a timeout error for the named operation
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// NNTP status code carried by this error, if any
    pub fn nntp_code(&self) -> Option<u16> {
        match self {
            Error::Nntp { code, .. } => Some(*code),
            Error::PoolStart { source, .. } => source.nntp_code(),
            _ => None,
        }
    }

    /// Whether the server reported the article as missing (430 / 423)
    pub fn is_missing_article(&self) -> bool {
        matches!(self.nntp_code(), Some(430) | Some(423))
    }
}
