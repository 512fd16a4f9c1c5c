//! Socket handle and connection lifecycle state machine.
//!
//! The [`Socket`] is the application-facing handle. Behind it, one
//! lifecycle task owns the connection state and the single active
//! transport instance, and processes transport events, handle commands,
//! and timer firings one at a time.
//!
//! # Lifecycle
//!
//! ```text
//!          initial delay            handshake
//! (spawn) ─────────────► CONNECTING ─────────► OPEN ──► CLOSING ──► CLOSED
//!                            ▲                   │
//!                            │   elected leader  │
//!                            └───────────────────┘
//!                             new identity, backoff,
//!                             up to max_retries
//! ```
//!
//! A client elected leader must not act as one: it tears down its
//! transport, discards its identity, and reconnects as a fresh peer
//! after a backoff delay. The application never observes a close during
//! this cycle; only retry exhaustion is terminal.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, interval, sleep_until};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::ParsedEnvelope;
use crate::protocol::envelope;
use crate::session::SessionId;
use crate::transport::{LinkCommand, Transport, TransportEvent, TransportLink};

use super::builder::SocketBuilder;
use super::options::SocketOptions;

// ============================================================================
// Constants
// ============================================================================

/// Interval of the status-sync tick that republishes the state watch.
const STATE_SYNC_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// SocketState
// ============================================================================

/// Connection state of a [`Socket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Waiting for the transport to open (initial delay, connect, or a
    /// leader-driven reconnect).
    Connecting,
    /// Transport open; messages flow.
    Open,
    /// Close requested, waiting for the transport to confirm.
    Closing,
    /// Terminal. No further transitions.
    Closed,
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Open => write!(f, "OPEN"),
            Self::Closing => write!(f, "CLOSING"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

// ============================================================================
// Lifecycle Events
// ============================================================================

/// An application message with its synthetic event metadata.
///
/// Mirrors a generic message-event shape so delivery stays
/// transport-agnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// The decoded message string.
    pub data: String,
    /// Message origin; empty for this transport.
    pub origin: String,
    /// Last event id; empty for this transport.
    pub last_event_id: String,
}

impl MessageEvent {
    fn new(data: String) -> Self {
        Self {
            data,
            origin: String::new(),
            last_event_id: String::new(),
        }
    }
}

/// Payload of the setup notification, fired once per transport instance
/// after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupInfo {
    /// Connection id assigned by the server.
    pub client_id: String,
    /// Last known leader, if any election was observed.
    pub leader_id: Option<String>,
    /// Whether this client is the leader (always false at handshake;
    /// a fresh identity cannot have been elected yet).
    pub is_leader: bool,
}

/// Close details forwarded from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close code, when the peer supplied one.
    pub code: Option<u16>,
    /// Close reason, empty when none was supplied.
    pub reason: String,
}

/// Lifecycle notifications delivered to the application.
///
/// Cardinality guarantees: `Connected` fires once per successful
/// handshake, `Setup` at most once per transport instance,
/// `RetriesExhausted` at most once and terminally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The handshake completed and the connection is established.
    Connected,
    /// An application message arrived.
    Message(MessageEvent),
    /// Handshake bookkeeping finished for this transport instance.
    Setup(SetupInfo),
    /// The transport closed.
    Closed(CloseEvent),
    /// A transport-level error, forwarded verbatim.
    Error(String),
    /// The leader-reconnect ceiling was exhausted. Terminal.
    RetriesExhausted {
        /// Retry counter at exhaustion (ceiling + 1).
        retry_count: u32,
    },
}

/// Stream of [`SocketEvent`]s.
pub type SocketEvents = mpsc::UnboundedReceiver<SocketEvent>;

// ============================================================================
// Identity
// ============================================================================

/// Identity snapshot shared between the handle and the lifecycle task.
#[derive(Debug, Clone)]
pub(crate) struct Identity {
    /// Session id for the current connection attempt.
    pub session_id: SessionId,
    /// Cookie presented to the transport.
    pub cookie: String,
    /// Connection id assigned by the server, null before handshake.
    pub connection_id: Option<String>,
    /// Equals the connection id once assigned.
    pub client_id: Option<String>,
    /// Last known leader.
    pub leader_id: Option<String>,
}

impl Identity {
    pub(crate) fn new(session_id: SessionId, cookie: String) -> Self {
        Self {
            session_id,
            cookie,
            connection_id: None,
            client_id: None,
            leader_id: None,
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Instructions from the handle to the lifecycle task.
enum SocketCommand {
    /// Queue or transmit an application message.
    Send(String),
    /// Close the connection.
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
}

// ============================================================================
// Socket
// ============================================================================

/// Leader-aware socket client.
///
/// Construct with [`Socket::builder`]. The connection is established in
/// the background after a randomized initial delay; messages sent
/// before the transport opens are queued and flushed in order.
///
/// # Example
///
/// ```no_run
/// use leaderwire::{Socket, Result};
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let socket = Socket::builder("wss://example.com/_w").build()?;
///     let mut events = socket.events().expect("first take");
///
///     socket.send("hello")?;
///     while let Some(event) = events.recv().await {
///         println!("{event:?}");
///     }
///     Ok(())
/// }
/// ```
pub struct Socket {
    /// Command channel into the lifecycle task.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    /// Observed connection state.
    state_rx: watch::Receiver<SocketState>,
    /// Identity snapshot shared with the lifecycle task.
    identity: Arc<RwLock<Identity>>,
    /// Event stream, taken once by the application.
    events: Mutex<Option<SocketEvents>>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Socket - Construction
// ============================================================================

impl Socket {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder(url: impl Into<String>) -> SocketBuilder {
        SocketBuilder::new(url)
    }

    /// Connects to `url` with default options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] or [`Error::Config`] for an unusable
    /// endpoint.
    pub fn connect(url: impl Into<String>) -> Result<Self> {
        Self::builder(url).build()
    }

    /// Spawns the lifecycle task. Called by the builder.
    ///
    /// Must run within a tokio runtime.
    pub(crate) fn spawn(
        url: Url,
        options: SocketOptions,
        identity: Identity,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SocketState::Connecting);
        let identity = Arc::new(RwLock::new(identity));

        let initial_delay = options.initial_delay();
        debug!(
            delay_ms = initial_delay.as_millis() as u64,
            "initial connection delay to reduce leadership probability"
        );

        let lifecycle = Lifecycle {
            url,
            options,
            transport,
            command_rx,
            event_tx,
            state_tx,
            identity: Arc::clone(&identity),
            link: None,
            queue: VecDeque::new(),
            retry_count: 0,
            pending_open: Some(PendingOpen::Initial(Instant::now() + initial_delay)),
            setup_announced: false,
            commands_closed: false,
            sync: interval(STATE_SYNC_INTERVAL),
        };
        tokio::spawn(lifecycle.run());

        Self {
            command_tx,
            state_rx,
            identity,
            events: Mutex::new(Some(event_rx)),
        }
    }
}

// ============================================================================
// Socket - Public API
// ============================================================================

impl Socket {
    /// Sends an application message.
    ///
    /// While `Connecting`, the wire-ready envelope is computed eagerly
    /// and queued for flush-on-open. During a leader-driven reconnect
    /// the message is dropped silently; applications needing delivery
    /// confirmation must run their own acknowledgement scheme.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOpen`] when the socket is `Closing` or
    /// `Closed`.
    pub fn send(&self, message: impl Into<String>) -> Result<()> {
        let state = self.state();
        if matches!(state, SocketState::Closing | SocketState::Closed) {
            return Err(Error::not_open(state));
        }

        self.command_tx
            .send(SocketCommand::Send(message.into()))
            .map_err(|_| Error::not_open(SocketState::Closed))
    }

    /// Closes the connection.
    ///
    /// Idempotent. Always cancels any pending reconnect so a retry
    /// cannot race a deliberate shutdown.
    pub fn close(&self, code: Option<u16>, reason: Option<String>) {
        let _ = self.command_tx.send(SocketCommand::Close { code, reason });
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SocketState {
        *self.state_rx.borrow()
    }

    /// Returns a watch receiver observing state transitions.
    #[inline]
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<SocketState> {
        self.state_rx.clone()
    }

    /// Takes the lifecycle event stream.
    ///
    /// Returns `None` on every call after the first.
    #[must_use]
    pub fn events(&self) -> Option<SocketEvents> {
        self.events.lock().take()
    }

    /// Returns the session id of the current connection attempt.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.identity.read().session_id.clone()
    }

    /// Returns the cookie presented to the transport.
    #[inline]
    #[must_use]
    pub fn cookie(&self) -> String {
        self.identity.read().cookie.clone()
    }

    /// Returns the server-assigned client id, once handshaked.
    #[inline]
    #[must_use]
    pub fn client_id(&self) -> Option<String> {
        self.identity.read().client_id.clone()
    }

    /// Returns the last known leader id.
    #[inline]
    #[must_use]
    pub fn leader_id(&self) -> Option<String> {
        self.identity.read().leader_id.clone()
    }
}

// ============================================================================
// PendingOpen
// ============================================================================

/// A scheduled transport open.
///
/// At most one exists at any time; scheduling a second without
/// cancelling the first is a contract violation.
enum PendingOpen {
    /// First open after the randomized initial delay.
    Initial(Instant),
    /// Reconnect after a leader-driven teardown; fires with a fresh
    /// session identity.
    Retry(Instant),
}

impl PendingOpen {
    fn at(&self) -> Instant {
        match self {
            Self::Initial(at) | Self::Retry(at) => *at,
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// The lifecycle task state.
///
/// All connection state is owned here and mutated only by the run loop;
/// the handle observes it through the watch and the identity lock.
struct Lifecycle {
    url: Url,
    options: SocketOptions,
    transport: Arc<dyn Transport>,
    command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    event_tx: mpsc::UnboundedSender<SocketEvent>,
    state_tx: watch::Sender<SocketState>,
    identity: Arc<RwLock<Identity>>,

    /// The single active transport instance.
    link: Option<TransportLink>,
    /// Wire-ready envelopes awaiting flush-on-open, FIFO.
    queue: VecDeque<String>,
    /// Leader-driven reconnect attempts so far.
    retry_count: u32,
    /// The one outstanding scheduled open, if any.
    pending_open: Option<PendingOpen>,
    /// Whether the setup notification fired for this transport instance.
    setup_announced: bool,
    /// All handles dropped; stop polling the command channel.
    commands_closed: bool,
    /// Status-sync tick republishing the state watch.
    sync: Interval,
}

impl Lifecycle {
    /// Runs the event loop until the terminal `Closed` state.
    async fn run(mut self) {
        loop {
            let open_at = self.pending_open.as_ref().map(PendingOpen::at);

            tokio::select! {
                event = next_link_event(&mut self.link) => {
                    match event {
                        Some(event) => self.handle_transport_event(event),
                        None => self.handle_link_lost(),
                    }
                }

                command = self.command_rx.recv(), if !self.commands_closed => {
                    match command {
                        Some(SocketCommand::Send(message)) => self.handle_send(message),
                        Some(SocketCommand::Close { code, reason }) => {
                            self.handle_close(code, reason);
                        }
                        None => {
                            self.commands_closed = true;
                            self.handle_close(None, None);
                        }
                    }
                }

                _ = sleep_until(open_at.unwrap_or_else(Instant::now)), if open_at.is_some() => {
                    self.handle_open_due().await;
                }

                _ = self.sync.tick() => {
                    // Mirror readiness back onto observers; transitions
                    // are pushed eagerly, the tick is a safety mirror.
                    let state = *self.state_tx.borrow();
                    self.state_tx.send_replace(state);
                }
            }

            if self.is_terminal() {
                debug!("lifecycle terminated");
                break;
            }
        }
    }

    // ========================================================================
    // State helpers
    // ========================================================================

    fn state(&self) -> SocketState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SocketState) {
        let previous = self.state();
        if previous != state {
            debug!(from = %previous, to = %state, "state transition");
        }
        self.state_tx.send_replace(state);
    }

    fn is_terminal(&self) -> bool {
        self.state() == SocketState::Closed && self.link.is_none() && self.pending_open.is_none()
    }

    fn emit(&self, event: SocketEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Truncates payload text for logging per `debug_max_chars`.
    fn clip<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let limit = self.options.debug_max_chars;
        if limit == 0 || text.chars().count() <= limit {
            return Cow::Borrowed(text);
        }
        let truncated: String = text.chars().take(limit).collect();
        Cow::Owned(format!("{truncated}..."))
    }

    // ========================================================================
    // Opening
    // ========================================================================

    /// A scheduled open came due.
    async fn handle_open_due(&mut self) {
        match self.pending_open.take() {
            Some(PendingOpen::Initial(_)) => self.open_transport().await,
            Some(PendingOpen::Retry(_)) => {
                // Reconnect under a fresh identity; the next handshake is
                // fully initial.
                let session_id = SessionId::generate();
                let cookie = session_id.cookie();
                info!(session_id = %session_id, "reconnecting with new session identity");
                {
                    let mut identity = self.identity.write();
                    identity.session_id = session_id;
                    identity.cookie = cookie;
                }
                self.setup_announced = false;
                self.open_transport().await;
            }
            None => {}
        }
    }

    async fn open_transport(&mut self) {
        let cookie = self.identity.read().cookie.clone();

        match self.transport.open(&self.url, Some(&cookie)).await {
            Ok(link) => {
                debug!("transport instance opened");
                self.link = Some(link);
            }
            Err(e) => {
                warn!(error = %e, "transport open failed");
                self.emit(SocketEvent::Error(e.to_string()));
                self.set_state(SocketState::Closed);
            }
        }
    }

    // ========================================================================
    // Transport events
    // ========================================================================

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                debug!("transport open, flushing queued messages");
                self.set_state(SocketState::Open);

                // FIFO flush: queued sends reach the wire in call order
                // before any subsequently issued send.
                while let Some(payload) = self.queue.pop_front() {
                    self.transmit(payload);
                }
            }

            TransportEvent::Message(text) => {
                if self.options.debug {
                    debug!(payload = %self.clip(&text), "raw envelope received");
                }
                self.handle_envelope(&text);
            }

            TransportEvent::Closed { code, reason } => {
                debug!(?code, "transport closed");
                self.link = None;
                self.set_state(SocketState::Closed);
                self.emit(SocketEvent::Closed(CloseEvent { code, reason }));
            }

            TransportEvent::Error(error) => {
                // Forwarded verbatim; the transport's own close event, if
                // any, drives the CLOSED transition.
                warn!(error = %error, "transport error");
                self.emit(SocketEvent::Error(error));
            }
        }
    }

    /// The link's event channel died without a close event.
    fn handle_link_lost(&mut self) {
        warn!("transport link lost without close");
        self.link = None;
        self.set_state(SocketState::Closed);
        self.emit(SocketEvent::Closed(CloseEvent {
            code: None,
            reason: String::new(),
        }));
    }

    // ========================================================================
    // Envelope handling
    // ========================================================================

    fn handle_envelope(&mut self, text: &str) {
        let parsed = envelope::unwrap(text, self.options.discriminant);
        trace!(kind = parsed.kind(), "envelope classified");

        match parsed {
            ParsedEnvelope::Protocol { connection_id, .. } => {
                match connection_id {
                    Some(connection_id) => self.handle_protocol(connection_id),
                    None => trace!("protocol envelope without connection id"),
                }
            }

            ParsedEnvelope::Election { leader_id } => {
                if let Some(leader_id) = leader_id {
                    self.handle_election(leader_id);
                }
            }

            ParsedEnvelope::Message { data, .. } => {
                if self.options.debug {
                    debug!(message = %self.clip(&data), "application message");
                }
                self.emit(SocketEvent::Message(MessageEvent::new(data)));
            }

            ParsedEnvelope::Error { error, .. } => {
                warn!(error = %error, "envelope parse failure");
            }
        }
    }

    /// Handshake detection: the first protocol envelope carrying a
    /// connection id establishes the connection.
    fn handle_protocol(&mut self, connection_id: String) {
        let initial_handshake = self.identity.read().connection_id.is_none();
        if !initial_handshake {
            // Repeat handshake envelopes update nothing.
            trace!(connection_id = %connection_id, "repeat protocol envelope ignored");
            return;
        }

        info!(connection_id = %connection_id, "handshake completed");
        let leader_id = {
            let mut identity = self.identity.write();
            identity.connection_id = Some(connection_id.clone());
            identity.client_id = Some(connection_id.clone());
            identity.leader_id.clone()
        };

        if self.retry_count > 0 {
            debug!(
                retry_count = self.retry_count,
                "reconnected after leader retry, resetting retry count"
            );
            self.retry_count = 0;
        }

        self.emit(SocketEvent::Connected);

        if !self.setup_announced {
            self.setup_announced = true;
            self.emit(SocketEvent::Setup(SetupInfo {
                client_id: connection_id,
                leader_id,
                is_leader: false,
            }));
        }
    }

    /// Election bookkeeping and leader evaluation.
    fn handle_election(&mut self, leader_id: String) {
        let i_am_leader = {
            let mut identity = self.identity.write();
            let i_am_leader = identity.client_id.as_deref() == Some(leader_id.as_str());
            identity.leader_id = Some(leader_id.clone());
            i_am_leader
        };

        debug!(leader_id = %leader_id, i_am_leader, "election observed");

        if i_am_leader {
            info!("elected leader, disconnecting to rejoin as follower");
            self.handle_leader_disconnection();
        }
    }

    // ========================================================================
    // Leader disconnection
    // ========================================================================

    /// Tears down the current transport and schedules a reconnect under
    /// a new identity, up to the retry ceiling.
    fn handle_leader_disconnection(&mut self) {
        self.retry_count += 1;
        info!(
            attempt = self.retry_count,
            max = self.options.retry.max_retries,
            "leader disconnection"
        );

        self.set_state(SocketState::Connecting);
        self.teardown_transport();

        if self.retry_count <= self.options.retry.max_retries {
            let delay = self.options.retry.delay(self.retry_count);
            info!(
                delay_ms = delay.as_millis() as u64,
                "retrying connection with new session"
            );
            self.pending_open = Some(PendingOpen::Retry(Instant::now() + delay));
        } else {
            warn!(
                max_retries = self.options.retry.max_retries,
                "retry ceiling exceeded, giving up"
            );
            self.set_state(SocketState::Closed);
            self.emit(SocketEvent::RetriesExhausted {
                retry_count: self.retry_count,
            });
        }
    }

    /// Full teardown: cancel any scheduled open, detach the transport,
    /// drop queued messages, and wipe the assigned identity.
    fn teardown_transport(&mut self) {
        self.pending_open = None;

        if let Some(link) = self.link.take() {
            // Dropping the link detaches all event delivery; the close
            // request lets the pump shut the connection down cleanly.
            let _ = link.commands.send(LinkCommand::Close {
                code: None,
                reason: None,
            });
        }

        self.queue.clear();

        let mut identity = self.identity.write();
        identity.connection_id = None;
        identity.client_id = None;
        identity.leader_id = None;
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn handle_send(&mut self, message: String) {
        // Mid-reconnect: the client must not transmit under a
        // soon-to-be-replaced identity.
        if self.retry_count > 0 && self.retry_count <= self.options.retry.max_retries {
            debug!("dropping send while retrying after leader role");
            return;
        }

        match self.state() {
            SocketState::Connecting => {
                let Some(payload) = self.wrap(&message) else {
                    return;
                };
                if self.options.debug {
                    debug!(message = %self.clip(&message), "queueing message while connecting");
                }
                self.queue.push_back(payload);
            }

            SocketState::Open => {
                let Some(payload) = self.wrap(&message) else {
                    return;
                };
                if self.options.debug {
                    debug!(message = %self.clip(&message), "sending message");
                }
                self.transmit(payload);
            }

            state @ (SocketState::Closing | SocketState::Closed) => {
                // The handle rejects these before sending the command;
                // reaching here means the state changed in between.
                warn!(state = %state, "send arrived after close, dropped");
            }
        }
    }

    fn handle_close(&mut self, code: Option<u16>, reason: Option<String>) {
        debug!(?code, "close requested");
        self.pending_open = None;
        self.set_state(SocketState::Closing);

        match self.link.as_ref() {
            Some(link) => {
                let _ = link.commands.send(LinkCommand::Close { code, reason });
                // The transport's close event drives CLOSED.
            }
            None => self.set_state(SocketState::Closed),
        }
    }

    // ========================================================================
    // Transmission
    // ========================================================================

    /// Computes the wire-ready envelope for a message.
    fn wrap(&self, message: &str) -> Option<String> {
        let identity = self.identity.read();
        match envelope::wrap(
            identity.session_id.as_str(),
            identity.connection_id.as_deref(),
            message,
            self.options.discriminant,
        ) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(error = %e, "envelope serialization failed, message dropped");
                None
            }
        }
    }

    fn transmit(&self, payload: String) {
        match self.link.as_ref() {
            Some(link) => {
                if link.commands.send(LinkCommand::Send(payload)).is_err() {
                    warn!("transport gone, message not sent");
                }
            }
            None => warn!("no transport instance, message not sent"),
        }
    }
}

/// Receives the next event from the active link, pending forever when
/// no link exists (the branch is disabled then anyway).
async fn next_link_event(link: &mut Option<TransportLink>) -> Option<TransportEvent> {
    match link.as_mut() {
        Some(link) => link.events.recv().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::{advance, sleep};
    use tokio_test::{assert_err, assert_ok};

    use crate::transport::mock::MockTransport;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    }

    /// Builds a socket against a fresh mock transport with no initial
    /// delay and no retry jitter.
    fn test_socket(configure: impl FnOnce(SocketBuilder) -> SocketBuilder) -> (Socket, MockTransport) {
        init_tracing();
        let mock = MockTransport::new();
        let builder = Socket::builder("ws://127.0.0.1:9/ws")
            .transport(Arc::new(mock.clone()))
            .initial_delay_max(Duration::ZERO);
        let socket = configure(builder).build().expect("build socket");
        (socket, mock)
    }

    /// Lets the lifecycle task process everything already queued.
    async fn settle() {
        for _ in 0..64 {
            tokio::task::yield_now().await;
        }
    }

    /// Waits until the mock has opened `count` transport instances.
    async fn wait_for_opens(mock: &MockTransport, count: usize) {
        for _ in 0..20_000 {
            if mock.open_count() >= count {
                settle().await;
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("transport never reached {count} opens");
    }

    fn drain(events: &mut SocketEvents) -> Vec<SocketEvent> {
        let mut collected = Vec::new();
        while let Ok(event) = events.try_recv() {
            collected.push(event);
        }
        collected
    }

    /// Drives attempt `index` through open + handshake.
    async fn open_and_handshake(mock: &MockTransport, index: usize, connection_id: &str) {
        wait_for_opens(mock, index + 1).await;
        mock.emit(index, TransportEvent::Open);
        mock.emit(
            index,
            TransportEvent::Message(format!(r#"{{"t":"protocol","c":"{connection_id}"}}"#)),
        );
        settle().await;
    }

    fn election(leader_id: &str) -> TransportEvent {
        TransportEvent::Message(format!(r#"{{"t":"e","l":"{leader_id}"}}"#))
    }

    // ------------------------------------------------------------------
    // Handshake
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_basic_handshake() {
        let (socket, mock) = test_socket(|b| b);
        let mut events = socket.events().expect("events");

        open_and_handshake(&mock, 0, "conn-1").await;

        assert_eq!(socket.state(), SocketState::Open);
        assert_eq!(socket.client_id().as_deref(), Some("conn-1"));

        let fired = drain(&mut events);
        assert_eq!(
            fired,
            vec![
                SocketEvent::Connected,
                SocketEvent::Setup(SetupInfo {
                    client_id: "conn-1".to_string(),
                    leader_id: None,
                    is_leader: false,
                }),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_handshake_is_noop() {
        let (socket, mock) = test_socket(|b| b);
        let mut events = socket.events().expect("events");

        open_and_handshake(&mock, 0, "conn-1").await;
        drain(&mut events);

        // A second protocol envelope must not re-fire callbacks or
        // update bookkeeping.
        mock.emit(
            0,
            TransportEvent::Message(r#"{"t":"protocol","c":"conn-2"}"#.to_string()),
        );
        settle().await;

        assert_eq!(socket.client_id().as_deref(), Some("conn-1"));
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_sends_session_cookie() {
        let (socket, mock) = test_socket(|b| b);
        wait_for_opens(&mock, 1).await;

        assert_eq!(mock.cookie(0), Some(socket.cookie()));
        assert!(socket.cookie().starts_with("sid="));
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_envelope_without_connection_id() {
        let (socket, mock) = test_socket(|b| b);
        let mut events = socket.events().expect("events");

        wait_for_opens(&mock, 1).await;
        mock.emit(0, TransportEvent::Open);
        mock.emit(0, TransportEvent::Message(r#"{"t":"protocol"}"#.to_string()));
        settle().await;

        assert_eq!(socket.client_id(), None);
        assert!(drain(&mut events).is_empty());
    }

    // ------------------------------------------------------------------
    // Message delivery
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_message_delivery_with_synthetic_metadata() {
        let (socket, mock) = test_socket(|b| b);
        let mut events = socket.events().expect("events");

        open_and_handshake(&mock, 0, "conn-1").await;
        drain(&mut events);

        let wire = envelope::wrap("other-session", Some("conn-9"), "ping", 0).expect("wrap");
        mock.emit(0, TransportEvent::Message(wire));
        settle().await;

        assert_eq!(
            drain(&mut events),
            vec![SocketEvent::Message(MessageEvent {
                data: "ping".to_string(),
                origin: String::new(),
                last_event_id: String::new(),
            })]
        );
    }

    // ------------------------------------------------------------------
    // Send contract & queue ordering
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_queue_flushes_in_order_on_open() {
        let (socket, mock) = test_socket(|b| b);
        wait_for_opens(&mock, 1).await;

        // Still CONNECTING: these queue.
        assert_ok!(socket.send("a"));
        assert_ok!(socket.send("b"));
        settle().await;
        assert!(mock.drain_sent(0).is_empty());

        mock.emit(0, TransportEvent::Open);
        settle().await;
        assert_ok!(socket.send("c"));
        settle().await;

        let session = socket.session_id();
        let expected: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|m| envelope::wrap(session.as_str(), None, m, 0).expect("wrap"))
            .collect();
        assert_eq!(mock.drain_sent(0), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_uses_connection_id_after_handshake() {
        let (socket, mock) = test_socket(|b| b);
        open_and_handshake(&mock, 0, "conn-1").await;
        mock.drain_sent(0);

        assert_ok!(socket.send("hello"));
        settle().await;

        let session = socket.session_id();
        assert_eq!(
            mock.drain_sent(0),
            vec![envelope::wrap(session.as_str(), Some("conn-1"), "hello", 0).expect("wrap")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_close_fails_not_open() {
        let (socket, mock) = test_socket(|b| b);
        open_and_handshake(&mock, 0, "conn-1").await;

        socket.close(Some(1000), None);
        settle().await;
        assert_eq!(socket.state(), SocketState::Closing);

        let err = assert_err!(socket.send("late"));
        assert!(matches!(
            err,
            Error::NotOpen {
                state: SocketState::Closing
            }
        ));
    }

    // ------------------------------------------------------------------
    // Elections
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_election_of_other_peer_only_bookkeeps() {
        let (socket, mock) = test_socket(|b| b);
        let mut events = socket.events().expect("events");

        open_and_handshake(&mock, 0, "conn-1").await;
        drain(&mut events);

        mock.emit(0, election("conn-2"));
        settle().await;

        assert_eq!(socket.state(), SocketState::Open);
        assert_eq!(socket.leader_id().as_deref(), Some("conn-2"));
        assert_eq!(mock.open_count(), 1);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_election_before_handshake_records_leader_only() {
        let (socket, mock) = test_socket(|b| b);

        wait_for_opens(&mock, 1).await;
        mock.emit(0, TransportEvent::Open);
        mock.emit(0, election("conn-7"));
        settle().await;

        assert_eq!(socket.leader_id().as_deref(), Some("conn-7"));
        assert_eq!(socket.state(), SocketState::Open);
        assert_eq!(mock.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_election_to_self_reconnects_with_new_identity() {
        let (socket, mock) = test_socket(|b| b);
        let mut events = socket.events().expect("events");

        open_and_handshake(&mock, 0, "conn-1").await;
        drain(&mut events);
        let first_cookie = mock.cookie(0).expect("cookie");

        let elected_at = Instant::now();
        mock.emit(0, election("conn-1"));
        settle().await;

        // Teardown: back to CONNECTING with a clean identity slate.
        assert_eq!(socket.state(), SocketState::Connecting);
        assert_eq!(socket.client_id(), None);
        assert_eq!(socket.leader_id(), None);

        // Sends mid-retry are dropped silently.
        assert_ok!(socket.send("dropped"));
        settle().await;

        // Reconnect lands within [base, base + jitter] of the election.
        wait_for_opens(&mock, 2).await;
        let elapsed = elected_at.elapsed();
        assert!(elapsed >= Duration::from_millis(2000), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(3020), "elapsed {elapsed:?}");

        // Fresh identity on the new attempt.
        let second_cookie = mock.cookie(1).expect("cookie");
        assert_ne!(first_cookie, second_cookie);
        assert_eq!(second_cookie, socket.cookie());

        // The dropped send never reached either instance.
        assert!(mock.drain_sent(0).is_empty());
        assert!(mock.drain_sent(1).is_empty());

        // No close surfaced to the application during the cycle.
        assert!(drain(&mut events).is_empty());

        // The new handshake is fully initial: connected + setup again.
        mock.emit(1, TransportEvent::Open);
        mock.emit(
            1,
            TransportEvent::Message(r#"{"t":"protocol","c":"conn-5"}"#.to_string()),
        );
        settle().await;

        assert_eq!(socket.state(), SocketState::Open);
        assert_eq!(socket.client_id().as_deref(), Some("conn-5"));
        let fired = drain(&mut events);
        assert!(fired.contains(&SocketEvent::Connected));
        assert!(fired.iter().any(|e| matches!(e, SocketEvent::Setup(_))));

        // Retry counter cleared: sends flow again.
        assert_ok!(socket.send("after"));
        settle().await;
        assert_eq!(mock.drain_sent(1).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_reset_keeps_promotion_cycle_alive() {
        // Each successful reconnect handshake clears the retry counter,
        // so repeated promotions never reach the ceiling.
        let (socket, mock) = test_socket(|b| {
            b.max_retries(2)
                .retry_base_delay(Duration::from_millis(10))
                .jitter_range(Duration::ZERO)
        });
        let mut events = socket.events().expect("events");

        for attempt in 0..5 {
            open_and_handshake(&mock, attempt, "always-leader").await;
            mock.emit(attempt, election("always-leader"));
            settle().await;
            assert_eq!(socket.state(), SocketState::Connecting);
        }

        // Well past max_retries promotions and still reconnecting.
        wait_for_opens(&mock, 6).await;
        assert!(
            !drain(&mut events)
                .iter()
                .any(|e| matches!(e, SocketEvent::RetriesExhausted { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_is_terminal() {
        // The ceiling guards consecutive promotions with no handshake
        // reset in between; drive the procedure directly.
        init_tracing();
        let (_command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (state_tx, _state_rx) = watch::channel(SocketState::Open);
        let session_id = SessionId::generate();
        let cookie = session_id.cookie();

        let mut lifecycle = Lifecycle {
            url: Url::parse("ws://127.0.0.1:9/ws").expect("url"),
            options: SocketOptions::new()
                .with_max_retries(3)
                .with_jitter_range(Duration::ZERO),
            transport: Arc::new(MockTransport::new()),
            command_rx,
            event_tx,
            state_tx,
            identity: Arc::new(RwLock::new(Identity::new(session_id, cookie))),
            link: None,
            queue: VecDeque::new(),
            retry_count: 0,
            pending_open: None,
            setup_announced: true,
            commands_closed: false,
            sync: interval(STATE_SYNC_INTERVAL),
        };

        for attempt in 1..=3 {
            lifecycle.handle_leader_disconnection();
            assert_eq!(lifecycle.retry_count, attempt);
            assert_eq!(lifecycle.state(), SocketState::Connecting);
            assert!(lifecycle.pending_open.is_some(), "reconnect scheduled");
        }

        // Ceiling exceeded: terminal, notified once, nothing scheduled.
        lifecycle.handle_leader_disconnection();
        assert_eq!(lifecycle.state(), SocketState::Closed);
        assert!(lifecycle.pending_open.is_none());
        assert!(lifecycle.is_terminal());

        match event_rx.try_recv() {
            Ok(SocketEvent::RetriesExhausted { retry_count }) => assert_eq!(retry_count, 4),
            other => panic!("expected exhaustion event, got {other:?}"),
        }
        assert!(event_rx.try_recv().is_err());
    }

    // ------------------------------------------------------------------
    // Close & errors
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_close_before_transport_exists() {
        init_tracing();
        let mock = MockTransport::new();
        let socket = Socket::builder("ws://127.0.0.1:9/ws")
            .transport(Arc::new(mock.clone()))
            .initial_delay_max(Duration::from_secs(3600))
            .build()
            .expect("build socket");

        socket.close(None, None);
        settle().await;
        assert_eq!(socket.state(), SocketState::Closed);

        // The cancelled initial open never fires.
        advance(Duration::from_secs(7200)).await;
        settle().await;
        assert_eq!(mock.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_completes_via_transport_close_event() {
        let (socket, mock) = test_socket(|b| b);
        let mut events = socket.events().expect("events");

        open_and_handshake(&mock, 0, "conn-1").await;
        drain(&mut events);

        socket.close(Some(1000), Some("done".to_string()));
        settle().await;
        assert_eq!(socket.state(), SocketState::Closing);

        let commands = mock.drain_commands(0);
        assert!(commands.contains(&LinkCommand::Close {
            code: Some(1000),
            reason: Some("done".to_string()),
        }));

        mock.emit(
            0,
            TransportEvent::Closed {
                code: Some(1000),
                reason: "done".to_string(),
            },
        );
        settle().await;

        assert_eq!(socket.state(), SocketState::Closed);
        assert_eq!(
            drain(&mut events),
            vec![SocketEvent::Closed(CloseEvent {
                code: Some(1000),
                reason: "done".to_string(),
            })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_retry() {
        let (socket, mock) = test_socket(|b| b);

        open_and_handshake(&mock, 0, "conn-1").await;
        mock.emit(0, election("conn-1"));
        settle().await;
        assert_eq!(socket.state(), SocketState::Connecting);

        socket.close(None, None);
        settle().await;
        assert_eq!(socket.state(), SocketState::Closed);

        // The scheduled reconnect must not race the shutdown.
        advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(mock.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_does_not_change_state() {
        let (socket, mock) = test_socket(|b| b);
        let mut events = socket.events().expect("events");

        open_and_handshake(&mock, 0, "conn-1").await;
        drain(&mut events);

        mock.emit(0, TransportEvent::Error("io broke".to_string()));
        settle().await;

        assert_eq!(socket.state(), SocketState::Open);
        assert_eq!(
            drain(&mut events),
            vec![SocketEvent::Error("io broke".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_close_notifies_application() {
        let (socket, mock) = test_socket(|b| b);
        let mut events = socket.events().expect("events");

        open_and_handshake(&mock, 0, "conn-1").await;
        drain(&mut events);

        mock.emit(
            0,
            TransportEvent::Closed {
                code: Some(1006),
                reason: String::new(),
            },
        );
        settle().await;

        assert_eq!(socket.state(), SocketState::Closed);
        assert_eq!(
            drain(&mut events),
            vec![SocketEvent::Closed(CloseEvent {
                code: Some(1006),
                reason: String::new(),
            })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_envelopes_are_absorbed() {
        let (socket, mock) = test_socket(|b| b);
        let mut events = socket.events().expect("events");

        open_and_handshake(&mock, 0, "conn-1").await;
        drain(&mut events);

        mock.emit(0, TransportEvent::Message("not json".to_string()));
        mock.emit(0, TransportEvent::Message(r#"{"b":"garbage!"}"#.to_string()));
        settle().await;

        // Logged only, never surfaced or fatal.
        assert_eq!(socket.state(), SocketState::Open);
        assert!(drain(&mut events).is_empty());
    }

    // ------------------------------------------------------------------
    // Events stream
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_events_taken_once() {
        let (socket, _mock) = test_socket(|b| b);
        assert!(socket.events().is_some());
        assert!(socket.events().is_none());
    }
}
