//! Binary message framing.
//!
//! One frame carries one application-level message string:
//!
//! ```text
//! ┌──────────────┬───────────────────┬──────────────────┐
//! │ Discriminant │ Declared length   │ Payload          │
//! │ 1 byte       │ varint            │ UTF-8 bytes      │
//! └──────────────┴───────────────────┴──────────────────┘
//! ```
//!
//! The producer doubles the payload length before varint-encoding it.
//! Two incompatible producers exist in the deployed system: a legacy one
//! declares roughly 40.7x the true length, and a third declares the raw
//! length. The decoder reconciles all three, see [`decode`].
//!
//! Decoding fails soft: every malformed input yields `None`, never an
//! error crossing this boundary.

// ============================================================================
// Imports
// ============================================================================

use tracing::trace;

use super::varint;

// ============================================================================
// Constants
// ============================================================================

/// Smallest possible frame: discriminant plus a one-byte varint.
pub const MIN_FRAME_LENGTH: usize = 2;

/// Standard producers declare `payload_length * 2`.
const LENGTH_FACTOR: u64 = 2;

/// Empirical divisor for the legacy length encoding.
///
/// The intended ratio is unknown; observed frames decode correctly with
/// this constant and no other. Do not unify with [`LENGTH_FACTOR`].
const LEGACY_LENGTH_DIVISOR: f64 = 40.6875;

/// A declared length this many times the available payload marks the
/// legacy encoding.
const LEGACY_DETECT_FACTOR: u64 = 10;

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a message string into a frame.
///
/// # Example
///
/// ```
/// use leaderwire::codec::frame;
///
/// let bytes = frame::encode("hi", 0);
/// // discriminant, varint(2 * 2), payload
/// assert_eq!(bytes, vec![0x00, 0x04, b'h', b'i']);
/// ```
#[must_use]
pub fn encode(message: &str, discriminant: u8) -> Vec<u8> {
    let payload = message.as_bytes();
    let mut frame = Vec::with_capacity(1 + varint::MAX_VARINT_BYTES + payload.len());

    frame.push(discriminant);
    varint::encode_into(&mut frame, payload.len() as u64 * LENGTH_FACTOR);
    frame.extend_from_slice(payload);
    frame
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes a frame into its message string.
///
/// Fails soft (`None`) when the buffer is shorter than
/// [`MIN_FRAME_LENGTH`], the leading byte differs from
/// `expected_discriminant`, the varint is invalid, fewer payload bytes
/// are available than declared, or the payload slice is not valid UTF-8.
/// Trailing bytes beyond the declared length are ignored.
///
/// The declared length is reconciled against the available payload in
/// this order:
///
/// 1. varint more than 10x the available length: legacy encoding,
///    true length is `round(varint / 40.6875)`;
/// 2. half the varint within 1 of the available length: standard doubled
///    encoding, `varint / 2`;
/// 3. the raw varint within 1 of the available length: undoubled;
/// 4. otherwise `varint / 2`.
#[must_use]
pub fn decode(buf: &[u8], expected_discriminant: u8) -> Option<String> {
    if buf.len() < MIN_FRAME_LENGTH {
        trace!(len = buf.len(), "frame buffer too short");
        return None;
    }

    if buf[0] != expected_discriminant {
        trace!(
            actual = buf[0],
            expected = expected_discriminant,
            "frame discriminant mismatch"
        );
        return None;
    }

    let Ok(decoded) = varint::decode(buf, 1) else {
        trace!(buffer = %buffer_to_hex(buf), "frame length varint invalid");
        return None;
    };

    let header_len = 1 + decoded.bytes_read;
    let available = buf.len() - header_len;
    let declared = resolve_declared_length(decoded.value, available);

    if available < declared {
        trace!(
            declared,
            available,
            short_by = declared - available,
            "frame payload truncated"
        );
        return None;
    }

    let payload = &buf[header_len..header_len + declared];
    match std::str::from_utf8(payload) {
        Ok(message) => Some(message.to_string()),
        Err(_) => {
            trace!(payload = %buffer_to_hex(payload), "frame payload not UTF-8");
            None
        }
    }
}

/// Reconciles the varint-declared length against the available payload.
fn resolve_declared_length(encoded: u64, available: usize) -> usize {
    let available_u64 = available as u64;

    if encoded > available_u64.saturating_mul(LEGACY_DETECT_FACTOR) {
        // Legacy producer: declared ~40.7x the true length.
        return (encoded as f64 / LEGACY_LENGTH_DIVISOR).round() as usize;
    }

    let halved = encoded as f64 / 2.0;
    if (halved - available as f64).abs() < 1.0 {
        return (encoded / LENGTH_FACTOR) as usize;
    }

    if (encoded as f64 - available as f64).abs() < 1.0 {
        return encoded as usize;
    }

    (encoded / LENGTH_FACTOR) as usize
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Formats a buffer as space-separated lowercase hex for logging.
///
/// # Example
///
/// ```
/// use leaderwire::codec::frame;
///
/// assert_eq!(frame::buffer_to_hex(&[0x00, 0xAB, 0x10]), "00 ab 10");
/// ```
#[must_use]
pub fn buffer_to_hex(buf: &[u8]) -> String {
    buf.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Tests
// ============================================================================
