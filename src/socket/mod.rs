//! Leader-aware socket client.
//!
//! The application-facing layer: a [`Socket`] handle in front of one
//! lifecycle task that owns the connection state and the active
//! transport instance.
//!
//! # Why leader-aware
//!
//! The server promotes exactly one connected client to "leader". A
//! client built on this adapter must not act as leader: on observing
//! its own election it disconnects, waits out a backoff delay, and
//! rejoins under a freshly generated session identity, up to a retry
//! ceiling. The cycle is invisible to the application except through
//! the terminal [`SocketEvent::RetriesExhausted`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent configuration and spawn |
//! | `core` | Socket handle and lifecycle state machine |
//! | `options` | Tunable lifecycle parameters |

// ============================================================================
// Submodules
// ============================================================================

/// Builder pattern for socket configuration.
pub mod builder;

/// Socket handle and connection lifecycle state machine.
pub mod core;

/// Socket configuration options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SocketBuilder;
pub use core::{
    CloseEvent, MessageEvent, SetupInfo, Socket, SocketEvent, SocketEvents, SocketState,
};
pub use options::{DEFAULT_DISCRIMINANT, DEFAULT_INITIAL_DELAY_MAX, SocketOptions};
