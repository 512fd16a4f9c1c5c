//! Binary wire codec.
//!
//! This module implements the compact binary format carried inside the
//! textual transport envelope.
//!
//! # Layers
//!
//! | Module | Description |
//! |--------|-------------|
//! | `varint` | 7-bit continuation integer encoding |
//! | `frame` | Tagged frame: discriminant + length + UTF-8 payload |
//!
//! Outbound: message string -> [`frame::encode`] -> base64 -> envelope.
//! Inbound: envelope body -> base64 decode -> [`frame::decode`] -> message.
//!
//! All decode failures are absorbed here: [`frame::decode`] returns
//! `None` for malformed input and never panics or propagates an error to
//! the connection layer.

// ============================================================================
// Submodules
// ============================================================================

/// Variable-length integer encoding.
pub mod varint;

/// Binary message framing.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use varint::{Decoded, MAX_VARINT_BYTES};
