//! Session identity.
//!
//! A session identifier is a random decimal number right-padded with a
//! fixed filler string to exactly 40 characters. The cookie form is
//! `sid=<identifier>` and is sent as a `Cookie` header on transports
//! that support custom headers.
//!
//! A fresh identifier is generated per connection attempt and
//! regenerated on every leader-driven reconnect; an identifier never
//! changes once assigned to an attempt.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

// ============================================================================
// Constants
// ============================================================================

/// Total length of a generated session identifier.
pub const SESSION_ID_LENGTH: usize = 40;

/// Lower bound of the random numeric component.
const SESSION_ID_MIN: u64 = 10_000;

/// Size of the random numeric range.
const SESSION_ID_RANGE: u64 = 990_000;

/// Filler appended to the numeric component up to the fixed length.
///
/// Always longer than the remaining gap for the configured range, so
/// padding never cycles and truncation never occurs.
const SESSION_ID_FILLER: &str = "c04b8f7b594cdeedebc2a8029b82943b0a620815";

/// Pattern extracting the session id from cookie text.
static COOKIE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sid=([^;]+)").expect("valid cookie pattern"));

// ============================================================================
// SessionId
// ============================================================================

/// A session identifier.
///
/// Generated identifiers are exactly [`SESSION_ID_LENGTH`] characters;
/// custom identifiers supplied through configuration are accepted
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session id from a caller-supplied string, verbatim.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random session id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Generates a fresh session id from the given randomness source.
    #[must_use]
    pub fn generate_with(rng: &mut impl Rng) -> Self {
        let number = rng.gen_range(0..SESSION_ID_RANGE) + SESSION_ID_MIN;
        let mut id = number.to_string();

        let gap = SESSION_ID_LENGTH.saturating_sub(id.len());
        id.extend(SESSION_ID_FILLER.chars().cycle().take(gap));

        Self(id)
    }

    /// Extracts a session id from cookie text.
    ///
    /// Returns `None` when no `sid=` entry is present.
    #[must_use]
    pub fn from_cookie(text: &str) -> Option<Self> {
        COOKIE_PATTERN
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|id| Self(id.as_str().to_string()))
    }

    /// Returns the cookie representation, `sid=<id>`.
    #[inline]
    #[must_use]
    pub fn cookie(&self) -> String {
        format!("sid={}", self.0)
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
