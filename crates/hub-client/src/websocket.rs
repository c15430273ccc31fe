//! WebSocket transport for JSON hubs.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{HubError, Result};
use crate::protocol::{self, HubMessage};
use crate::transport::{HubLink, HubTransport};

/// Default time allowed for the hub to answer the handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Rewrite `http(s)` hub URLs to `ws(s)`.
pub fn websocket_url(url: &Url) -> Result<Url> {
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(HubError::connection(format!(
                "Unsupported hub URL scheme: {other}"
            )));
        }
    };

    let mut ws = url.clone();
    if ws.scheme() != scheme {
        // http -> ws and https -> wss are both special schemes, so this cannot fail.
        ws.set_scheme(scheme)
            .map_err(|_| HubError::connection(format!("Cannot rewrite scheme of {url}")))?;
    }
    Ok(ws)
}

/// Connects to hubs over WebSocket.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketTransport {
    handshake_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    async fn read_handshake(stream: &mut WsStream) -> Result<VecDeque<HubMessage>> {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let rest = protocol::parse_handshake_response(text.as_str())?;
                    return Ok(protocol::decode_frame(rest)?.into());
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(HubError::handshake(format!(
                        "hub closed the connection during handshake: {frame:?}"
                    )));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(HubError::handshake(
                        "hub closed the connection during handshake",
                    ));
                }
            }
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HubTransport for WebSocketTransport {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn connect(&self, url: &Url) -> Result<Box<dyn HubLink>> {
        let ws_url = websocket_url(url)?;
        debug!(
            host = ws_url.host_str().unwrap_or_default(),
            path = ws_url.path(),
            "Connecting to hub"
        );

        let (mut stream, _) = connect_async(ws_url.as_str()).await?;
        stream
            .send(Message::Text(protocol::handshake_request().into()))
            .await?;

        let pending =
            match tokio::time::timeout(self.handshake_timeout, Self::read_handshake(&mut stream))
                .await
            {
                Ok(Ok(pending)) => pending,
                Ok(Err(e)) => {
                    let _ = stream.close(None).await;
                    return Err(e);
                }
                Err(_) => {
                    let _ = stream.close(None).await;
                    return Err(HubError::handshake(format!(
                        "no handshake response within {:?}",
                        self.handshake_timeout
                    )));
                }
            };

        info!(path = ws_url.path(), "Hub handshake completed");
        Ok(Box::new(WebSocketLink {
            stream,
            pending,
            closed: false,
        }))
    }
}

/// A handshaken WebSocket link.
struct WebSocketLink {
    stream: WsStream,
    /// Messages decoded from a frame but not yet handed out.
    pending: VecDeque<HubMessage>,
    closed: bool,
}

#[async_trait]
impl HubLink for WebSocketLink {
    async fn send(&mut self, message: HubMessage) -> Result<()> {
        if self.closed {
            return Err(HubError::ConnectionLost);
        }
        let text = protocol::encode(&message)?;
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<HubMessage>> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Some(Ok(message));
            }
            if self.closed {
                return None;
            }

            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => match protocol::decode_frame(text.as_str()) {
                    Ok(messages) => self.pending.extend(messages),
                    Err(e) => return Some(Err(e)),
                },
                Some(Ok(Message::Binary(_))) => {
                    return Some(Err(HubError::protocol(
                        "binary frames are not part of the json hub protocol",
                    )));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Hub sent WebSocket close");
                    self.closed = true;
                    return None;
                }
                Some(Ok(_)) => {
                    // Ping/Pong frames are answered by tungstenite.
                    trace!("Skipping WebSocket control frame");
                }
                Some(Err(e)) => {
                    self.closed = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            warn!("Failed to close hub WebSocket cleanly: {}", e);
        }
    }
}
