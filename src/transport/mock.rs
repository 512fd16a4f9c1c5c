//! Scripted transport for lifecycle tests.
//!
//! Records every `open` call and hands the test direct control over the
//! event channel of each opened instance, so scenarios can drive the
//! state machine deterministically: deliver the open, inject handshake
//! and election envelopes, observe what was transmitted.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;

use super::{LinkCommand, Transport, TransportEvent, TransportLink};

// ============================================================================
// MockTransport
// ============================================================================

/// One recorded transport instance.
pub(crate) struct OpenedLink {
    /// Cookie supplied at open time.
    pub cookie: Option<String>,
    /// Injects events into the lifecycle machine.
    pub event_tx: mpsc::UnboundedSender<TransportEvent>,
    /// Drains commands the machine issued to this instance.
    pub command_rx: mpsc::UnboundedReceiver<LinkCommand>,
}

/// Transport factory that scripts every opened instance.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    links: Arc<Mutex<Vec<OpenedLink>>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of transport instances opened so far.
    pub(crate) fn open_count(&self) -> usize {
        self.links.lock().len()
    }

    /// Cookie presented by the given attempt.
    pub(crate) fn cookie(&self, index: usize) -> Option<String> {
        self.links.lock()[index].cookie.clone()
    }

    /// Delivers a transport event to the given attempt.
    ///
    /// Returns `false` when the machine has already detached.
    pub(crate) fn emit(&self, index: usize, event: TransportEvent) -> bool {
        self.links.lock()[index].event_tx.send(event).is_ok()
    }

    /// Drains and returns all commands issued to the given attempt.
    pub(crate) fn drain_commands(&self, index: usize) -> Vec<LinkCommand> {
        let mut links = self.links.lock();
        let mut commands = Vec::new();
        while let Ok(command) = links[index].command_rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// Drains the given attempt and keeps only transmitted payloads.
    pub(crate) fn drain_sent(&self, index: usize) -> Vec<String> {
        self.drain_commands(index)
            .into_iter()
            .filter_map(|command| match command {
                LinkCommand::Send(text) => Some(text),
                LinkCommand::Close { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &Url, cookie: Option<&str>) -> Result<TransportLink> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        self.links.lock().push(OpenedLink {
            cookie: cookie.map(str::to_string),
            event_tx,
            command_rx,
        });

        Ok(TransportLink {
            commands: command_tx,
            events: event_rx,
        })
    }
}
