//! The wire seam under the push channel: a trait pair so the reconnecting
//! driver can run over a real websocket in production and an in-memory
//! duplex in tests.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use relaychat_shared::protocol::{ClientEvent, ServerEvent};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::SyncError;

/// One established bidirectional connection.
#[async_trait]
pub trait Transport: Send {
    /// Writes one event to the wire.
    ///
    /// # Errors
    /// Any error means the connection is dead; the driver reconnects.
    async fn send(&mut self, event: ClientEvent) -> Result<(), SyncError>;

    /// Reads the next server event, in the order the transport delivered
    /// them. `None` means the connection closed.
    async fn next_event(&mut self) -> Option<Result<ServerEvent, SyncError>>;
}

/// Dials new connections for the push channel's reconnect loop.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced.
    type Transport: Transport + 'static;

    /// Establishes a fresh connection.
    ///
    /// # Errors
    /// Connection failures are transient; the driver backs off and retries.
    async fn connect(&self) -> Result<Self::Transport, SyncError>;
}

/// Production websocket connector.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Creates a connector dialing `url` (e.g. `ws://host:8080/ws`).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self) -> Result<WsTransport, SyncError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|err| SyncError::Transient(format!("websocket connect failed: {err}")))?;
        Ok(WsTransport { stream })
    }
}

/// Websocket transport carrying JSON protocol frames.
#[derive(Debug)]
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, event: ClientEvent) -> Result<(), SyncError> {
        let frame = serde_json::to_string(&event)
            .map_err(|err| SyncError::Internal(format!("failed to encode event: {err}")))?;
        self.stream
            .send(WsMessage::text(frame))
            .await
            .map_err(|err| SyncError::Transient(format!("websocket send failed: {err}")))
    }

    async fn next_event(&mut self) -> Option<Result<ServerEvent, SyncError>> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    return Some(serde_json::from_str(text.as_str()).map_err(|err| {
                        SyncError::Internal(format!("malformed server event: {err}"))
                    }));
                }
                Ok(WsMessage::Close(_)) => return None,
                // Control frames and binary noise are skipped.
                Ok(_) => {}
                Err(err) => {
                    return Some(Err(SyncError::Transient(format!(
                        "websocket read failed: {err}"
                    ))));
                }
            }
        }
        None
    }
}
