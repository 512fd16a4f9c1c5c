//! Transport layer.
//!
//! The lifecycle state machine drives one underlying duplex transport
//! instance at a time through the [`Transport`] seam. A transport
//! surfaces its activity as a stream of [`TransportEvent`]s and accepts
//! [`LinkCommand`]s; the machine owns exactly one [`TransportLink`] per
//! connection attempt and detaches from it wholesale by dropping it.
//!
//! ```text
//! ┌──────────────────┐   TransportEvent    ┌──────────────────┐
//! │  Lifecycle task  │◄────────────────────│  Link pump task  │
//! │                  │────────────────────►│  (one per open)  │
//! └──────────────────┘    LinkCommand      └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `ws` | tokio-tungstenite WebSocket implementation |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket transport implementation.
pub mod ws;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use ws::WsTransport;

// ============================================================================
// Events & Commands
// ============================================================================

/// Activity reported by a transport instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport finished connecting and is writable.
    Open,

    /// A text message arrived.
    Message(String),

    /// The transport closed; no further events follow.
    Closed {
        /// Close code, when the peer supplied one.
        code: Option<u16>,
        /// Close reason, empty when the peer supplied none.
        reason: String,
    },

    /// A transport-level error. Does not imply closure by itself; a
    /// `Closed` event follows when the error was fatal.
    Error(String),
}

/// Instruction for a transport instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    /// Transmit a text message.
    Send(String),

    /// Close the transport with an optional code and reason.
    Close {
        /// Close code to send to the peer.
        code: Option<u16>,
        /// Close reason to send to the peer.
        reason: Option<String>,
    },
}

// ============================================================================
// TransportLink
// ============================================================================

/// Handle to one live transport instance.
///
/// Dropping the link detaches all event delivery and asks the pump to
/// close the underlying connection; no callbacks can leak across a
/// reconnect.
#[derive(Debug)]
pub struct TransportLink {
    /// Command channel into the transport pump.
    pub commands: mpsc::UnboundedSender<LinkCommand>,

    /// Event channel out of the transport pump.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

// ============================================================================
// Transport
// ============================================================================

/// Factory for transport instances.
///
/// One instance is opened per connection attempt. `open` fails only on
/// malformed parameters; connection failures are delivered through the
/// returned link as `Error` and `Closed` events, mirroring how a
/// browser-style socket reports them.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a new transport instance toward `url`.
    ///
    /// `cookie` is sent as a `Cookie` header when the transport supports
    /// custom headers.
    async fn open(&self, url: &Url, cookie: Option<&str>) -> Result<TransportLink>;
}
