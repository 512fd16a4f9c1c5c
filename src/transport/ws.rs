//! WebSocket transport implementation.
//!
//! Bridges a tokio-tungstenite stream onto the [`Transport`] seam. Each
//! [`WsTransport::open`] spawns one pump task that owns the socket,
//! forwards inbound text frames as events, and applies link commands to
//! the write half.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{LinkCommand, Transport, TransportEvent, TransportLink};

// ============================================================================
// WsTransport
// ============================================================================

/// WebSocket transport backed by tokio-tungstenite.
///
/// The default transport used by
/// [`SocketBuilder`](crate::socket::SocketBuilder) unless another
/// implementation is injected.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Creates a new WebSocket transport factory.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &Url, cookie: Option<&str>) -> Result<TransportLink> {
        let request = build_request(url, cookie)?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_link(request, command_rx, event_tx));

        Ok(TransportLink {
            commands: command_tx,
            events: event_rx,
        })
    }
}

// ============================================================================
// Handshake Request
// ============================================================================

/// Builds the client handshake request, attaching the session cookie.
fn build_request(url: &Url, cookie: Option<&str>) -> Result<Request> {
    let mut request = url.as_str().into_client_request()?;

    if let Some(cookie) = cookie {
        let value = cookie
            .parse()
            .map_err(|_| Error::config(format!("invalid cookie header: {cookie}")))?;
        request.headers_mut().insert(COOKIE, value);
    }

    Ok(request)
}

// ============================================================================
// Link Pump
// ============================================================================

/// Owns one WebSocket for its whole life: connect, pump, close.
async fn run_link(
    request: Request,
    mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let ws_stream = match connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!(error = %e, "WebSocket connect failed");
            let _ = event_tx.send(TransportEvent::Error(e.to_string()));
            let _ = event_tx.send(TransportEvent::Closed {
                code: None,
                reason: "connect failed".to_string(),
            });
            return;
        }
    };

    debug!("WebSocket connected");
    let _ = event_tx.send(TransportEvent::Open);

    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let _ = event_tx.send(TransportEvent::Message(text.to_string()));
                    }

                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => {
                                (Some(u16::from(frame.code)), frame.reason.to_string())
                            }
                            None => (None, String::new()),
                        };
                        debug!(?code, "WebSocket closed by remote");
                        let _ = event_tx.send(TransportEvent::Closed { code, reason });
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        let _ = event_tx.send(TransportEvent::Closed {
                            code: None,
                            reason: String::new(),
                        });
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        let _ = event_tx.send(TransportEvent::Closed {
                            code: None,
                            reason: String::new(),
                        });
                        break;
                    }

                    // Ignore Binary, Ping, Pong, Frame
                    _ => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(LinkCommand::Send(text)) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(error = %e, "WebSocket send failed");
                            let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        }
                    }

                    Some(LinkCommand::Close { code, reason }) => {
                        debug!(?code, "closing WebSocket");
                        let frame = code.map(|code| CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.unwrap_or_default().into(),
                        });
                        if let Err(e) = ws_write.send(Message::Close(frame)).await {
                            debug!(error = %e, "close frame not sent");
                        }
                        // Keep reading until the peer acknowledges; the
                        // close reply drives the Closed event.
                    }

                    None => {
                        // Link dropped: detach silently and shut the socket.
                        debug!("transport link detached");
                        let _ = ws_write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("transport pump terminated");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_sets_cookie() {
        let url = Url::parse("ws://127.0.0.1:9999/ws").expect("url");
        let request = build_request(&url, Some("sid=abc123")).expect("request");

        assert_eq!(
            request.headers().get(COOKIE).map(|v| v.to_str().unwrap()),
            Some("sid=abc123")
        );
    }

    #[test]
    fn test_build_request_without_cookie() {
        let url = Url::parse("ws://127.0.0.1:9999/ws").expect("url");
        let request = build_request(&url, None).expect("request");
        assert!(request.headers().get(COOKIE).is_none());
    }

    #[test]
    fn test_build_request_rejects_invalid_cookie() {
        let url = Url::parse("ws://127.0.0.1:9999/ws").expect("url");
        let result = build_request(&url, Some("sid=\n"));
        assert!(result.is_err());
    }
}
