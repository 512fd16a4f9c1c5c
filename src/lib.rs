//! Leaderwire - leader-aware WebSocket client adapter.
//!
//! This library sits between an application and a WebSocket endpoint of
//! a backend that elects one connected client as "leader". It frames
//! application messages into a compact binary format multiplexed inside
//! a textual envelope, and manages a connection lifecycle that
//! proactively disconnects and rejoins under a new identity whenever
//! this client is the one elected.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  send / events   ┌──────────────────┐
//! │   Application   │◄────────────────►│  Socket handle   │
//! └─────────────────┘                  └────────┬─────────┘
//!                                               │ commands / watch
//!                                      ┌────────▼─────────┐
//!                                      │  Lifecycle task  │
//!                                      │  (state machine) │
//!                                      └────────┬─────────┘
//!                                               │ one link per attempt
//!                                      ┌────────▼─────────┐
//!                                      │    Transport     │
//!                                      └──────────────────┘
//! ```
//!
//! Outbound: message -> binary frame -> base64 -> JSON envelope ->
//! transport. Inbound: envelope -> classification (handshake, election,
//! message) -> lifecycle machine -> application events.
//!
//! # Quick Start
//!
//! ```no_run
//! use leaderwire::{Socket, SocketEvent, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let socket = Socket::builder("wss://example.com/_w")
//!         .max_retries(5)
//!         .build()?;
//!     let mut events = socket.events().expect("first take");
//!
//!     socket.send("hello backend")?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SocketEvent::Message(message) => println!("got: {}", message.data),
//!             SocketEvent::RetriesExhausted { retry_count } => {
//!                 eprintln!("gave up after {retry_count} leader promotions");
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`codec`] | Varint and binary frame codecs |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | Textual transport envelope |
//! | [`retry`] | Reconnect backoff policy |
//! | [`session`] | Session identity and cookies |
//! | [`socket`] | Socket handle and lifecycle state machine |
//! | [`transport`] | Transport seam and WebSocket implementation |
//!
//! # Design Notes
//!
//! - Codec faults never cross the envelope boundary: malformed frames
//!   and unparsable envelopes are logged and absorbed.
//! - The lifecycle machine owns all connection state; the handle
//!   observes it through a watch channel and an identity snapshot.
//! - Sends issued mid-reconnect are dropped silently by design; track
//!   delivery with an application-level acknowledgement scheme if
//!   needed.

// ============================================================================
// Modules
// ============================================================================

/// Varint and binary frame codecs.
pub mod codec;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Textual transport envelope: wrap, unwrap, classification.
pub mod protocol;

/// Reconnect backoff policy.
pub mod retry;

/// Session identity and cookie handling.
pub mod session;

/// Socket handle and connection lifecycle state machine.
pub mod socket;

/// Transport seam and WebSocket implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Socket types
pub use socket::{
    CloseEvent, MessageEvent, SetupInfo, Socket, SocketBuilder, SocketEvent, SocketEvents,
    SocketOptions, SocketState,
};

// Error types
pub use error::{Error, Result};

// Protocol types
pub use protocol::ParsedEnvelope;

// Session types
pub use session::SessionId;

// Retry types
pub use retry::RetryPolicy;

// Transport types
pub use transport::{LinkCommand, Transport, TransportEvent, TransportLink, WsTransport};
