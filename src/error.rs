//! Error types for the leader-aware socket client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use leaderwire::{Result, Socket};
//!
//! fn example(socket: &Socket) -> Result<()> {
//!     socket.send("ping")?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`] |
//! | Connection | [`Error::Connection`], [`Error::NotOpen`] |
//! | Codec | [`Error::InvalidVarint`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |
//!
//! Codec faults are absorbed before they reach the application: the frame
//! decoder fails soft (`None`) and the envelope parser yields an error
//! variant instead of propagating. [`Error::InvalidVarint`] therefore only
//! crosses the varint decoder boundary, never the connection boundary.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::socket::SocketState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when socket configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URL failed to parse.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Underlying transport failed.
    ///
    /// Returned when the transport cannot be opened or written to.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Send attempted while the socket is closing or closed.
    ///
    /// Callers must check [`Socket::state`](crate::Socket::state) or handle
    /// this failure; sends in `Connecting` are queued, not rejected.
    #[error("Socket is not open: state {state}")]
    NotOpen {
        /// The socket state at the time of the send.
        state: SocketState,
    },

    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// Varint did not terminate within the 5-byte decode bound.
    ///
    /// Bounds worst-case decode cost and rejects corrupt streams.
    #[error("Invalid varint: no terminating byte within 5 bytes")]
    InvalidVarint,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a not-open error for the given state.
    #[inline]
    pub fn not_open(state: SocketState) -> Self {
        Self::NotOpen { state }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::NotOpen { .. } | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a codec-level error.
    ///
    /// Codec errors never cross the envelope boundary; seeing one outside
    /// the codec modules indicates misuse.
    #[inline]
    #[must_use]
    pub fn is_codec_error(&self) -> bool {
        matches!(self, Self::InvalidVarint)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("unsupported scheme");
        assert_eq!(err.to_string(), "Configuration error: unsupported scheme");
    }

    #[test]
    fn test_not_open_reports_state() {
        let err = Error::not_open(SocketState::Closing);
        assert_eq!(err.to_string(), "Socket is not open: state CLOSING");
    }

    #[test]
    fn test_is_connection_error() {
        let conn_err = Error::connection("test");
        let not_open_err = Error::not_open(SocketState::Closed);
        let other_err = Error::config("test");

        assert!(conn_err.is_connection_error());
        assert!(not_open_err.is_connection_error());
        assert!(!other_err.is_connection_error());
    }

    #[test]
    fn test_is_codec_error() {
        assert!(Error::InvalidVarint.is_codec_error());
        assert!(!Error::config("test").is_codec_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
