//! Builder pattern for socket configuration.
//!
//! Provides a fluent API for configuring and creating [`Socket`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use leaderwire::Socket;
//!
//! # fn example() -> leaderwire::Result<()> {
//! let socket = Socket::builder("wss://example.com/_w")
//!     .max_retries(5)
//!     .session_id("custom-session")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::session::SessionId;
use crate::transport::{Transport, WsTransport};

use super::core::{Identity, Socket};
use super::options::SocketOptions;

// ============================================================================
// SocketBuilder
// ============================================================================

/// Builder for configuring a [`Socket`] instance.
///
/// Use [`Socket::builder()`] to create a new builder.
pub struct SocketBuilder {
    /// Endpoint URL.
    url: String,
    /// Lifecycle options.
    options: SocketOptions,
    /// Custom session id, verbatim.
    session_id: Option<String>,
    /// Custom cookie string; takes precedence over `session_id`.
    cookie: Option<String>,
    /// Transport factory override.
    transport: Option<Arc<dyn Transport>>,
}

// ============================================================================
// SocketBuilder Implementation
// ============================================================================

impl SocketBuilder {
    /// Creates a new builder targeting `url`.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: SocketOptions::new(),
            session_id: None,
            cookie: None,
            transport: None,
        }
    }

    /// Replaces the full options struct.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: SocketOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the frame discriminant.
    #[inline]
    #[must_use]
    pub fn discriminant(mut self, discriminant: u8) -> Self {
        self.options = self.options.with_discriminant(discriminant);
        self
    }

    /// Sets the maximum number of leader-driven reconnect attempts.
    #[inline]
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.options = self.options.with_max_retries(max_retries);
        self
    }

    /// Sets the base delay for the first reconnect attempt.
    #[inline]
    #[must_use]
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.options = self.options.with_retry_base_delay(delay);
        self
    }

    /// Sets the ceiling on any single reconnect delay.
    #[inline]
    #[must_use]
    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.options = self.options.with_retry_max_delay(delay);
        self
    }

    /// Sets the exponential backoff growth factor.
    #[inline]
    #[must_use]
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.options = self.options.with_backoff_factor(factor);
        self
    }

    /// Sets the jitter range added to each reconnect delay.
    #[inline]
    #[must_use]
    pub fn jitter_range(mut self, range: Duration) -> Self {
        self.options = self.options.with_jitter_range(range);
        self
    }

    /// Sets the upper bound on the randomized initial delay.
    #[inline]
    #[must_use]
    pub fn initial_delay_max(mut self, max: Duration) -> Self {
        self.options = self.options.with_initial_delay_max(max);
        self
    }

    /// Enables payload-level debug logging.
    #[inline]
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.options = self.options.with_debug(debug);
        self
    }

    /// Truncates logged payloads to `max_chars` (0 = unlimited).
    #[inline]
    #[must_use]
    pub fn debug_max_chars(mut self, max_chars: usize) -> Self {
        self.options = self.options.with_debug_max_chars(max_chars);
        self
    }

    /// Uses a custom session id for the first connection attempt.
    ///
    /// Ignored when a cookie carrying an extractable session id is also
    /// configured.
    #[inline]
    #[must_use]
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Uses a custom cookie string, kept verbatim.
    ///
    /// Takes precedence over [`session_id`](Self::session_id) when a
    /// session id is extractable from it.
    #[inline]
    #[must_use]
    pub fn cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Injects a transport implementation.
    ///
    /// Defaults to [`WsTransport`].
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the socket and spawns its lifecycle task.
    ///
    /// Must be called within a tokio runtime; the connection is opened
    /// in the background after the randomized initial delay.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the endpoint fails to parse
    /// - [`Error::Config`] if the scheme is not `ws`/`wss` or the
    ///   options fail validation
    pub fn build(self) -> Result<Socket> {
        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "unsupported scheme '{}', expected ws or wss",
                url.scheme()
            )));
        }

        self.options.validate().map_err(Error::config)?;

        let identity = resolve_identity(self.session_id, self.cookie);
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WsTransport::new()));

        Ok(Socket::spawn(url, self.options, identity, transport))
    }
}

// ============================================================================
// Identity Resolution
// ============================================================================

/// Resolves the initial session identity from the configured overrides.
///
/// A configured cookie wins when a session id is extractable from it;
/// the cookie text itself is kept verbatim either way.
fn resolve_identity(session_id: Option<String>, cookie: Option<String>) -> Identity {
    match (session_id, cookie) {
        (_, Some(cookie)) => {
            let session_id =
                SessionId::from_cookie(&cookie).unwrap_or_else(SessionId::generate);
            Identity::new(session_id, cookie)
        }
        (Some(session_id), None) => {
            let session_id = SessionId::new(session_id);
            let cookie = session_id.cookie();
            Identity::new(session_id, cookie)
        }
        (None, None) => {
            let session_id = SessionId::generate();
            let cookie = session_id.cookie();
            Identity::new(session_id, cookie)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
