//! Error types for nefit-client.

use thiserror::Error;

use crate::protocol::RequestMethod;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum NefitError {
    /// Missing or invalid credential / configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No active transport session.
    #[error("Not connected")]
    NotConnected,

    /// Transport-level failure (connect, send, receive, close).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed status line, non-numeric status code, or malformed XML.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Cipher setup or base64 decode failure.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The attempt deadline passed before a response arrived.
    #[error("Request timeout: deadline exceeded")]
    Timeout,

    /// The caller cancelled the operation.
    #[error("Request cancelled")]
    Cancelled,

    /// The device answered with a status code of 300 or above.
    #[error("Remote rejected request: HTTP {status} {reason}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Reason phrase from the status line.
        reason: String,
    },

    /// The backend answered with an error-type message stanza.
    #[error("Error stanza: {0}")]
    ErrorStanza(String),

    /// Operation attempted after the request queue shut down.
    #[error("Request queue is closed")]
    QueueClosed,

    /// JSON serialization error for PUT payloads.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A logical GET/PUT failed; wraps the last attempt's error.
    #[error("{method} {uri} failed after {attempts} attempt(s): {source}")]
    RequestFailed {
        /// Request method.
        method: RequestMethod,
        /// Target URI.
        uri: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: Box<NefitError>,
    },
}

impl NefitError {
    /// True when the error is an attempt deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, NefitError::Timeout)
    }

    /// True when a PUT attempt failing with this error may be retried.
    ///
    /// Besides [`NefitError::Timeout`], transport errors whose text mentions a
    /// timeout are retryable too.
    pub fn is_put_retryable(&self) -> bool {
        match self {
            NefitError::Timeout => true,
            NefitError::Remote { .. } => false,
            other => other.to_string().contains("timeout"),
        }
    }

    /// Status code and reason of a remote rejection, looking through
    /// [`NefitError::RequestFailed`].
    pub fn remote_status(&self) -> Option<(u16, &str)> {
        match self {
            NefitError::Remote { status, reason } => Some((*status, reason.as_str())),
            NefitError::RequestFailed { source, .. } => source.remote_status(),
            _ => None,
        }
    }

    /// Innermost error, looking through [`NefitError::RequestFailed`].
    pub fn root(&self) -> &NefitError {
        match self {
            NefitError::RequestFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias using NefitError.
pub type Result<T> = std::result::Result<T, NefitError>;
