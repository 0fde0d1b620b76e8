//! Channel transports
//!
//! The channel task only needs to move text frames. A [`Connector`] opens a
//! fresh [`Transport`] for every (re)connection attempt.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::connection::ChannelError;

/// A connected, bidirectional text-frame pipe
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one text frame
    async fn send(&mut self, frame: String) -> Result<(), ChannelError>;

    /// Receive the next text frame. `None` once the peer closed the connection.
    async fn recv(&mut self) -> Option<Result<String, ChannelError>>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), ChannelError>;
}

/// Opens transports to the room channel server
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self) -> Result<Self::Transport, ChannelError>;
}

/// WebSocket connector
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self) -> Result<WsTransport, ChannelError> {
        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        debug!("WebSocket connected to {}", self.url);
        Ok(WsTransport { stream })
    }
}

/// WebSocket transport (text frames only; pings are answered by tungstenite)
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> Result<(), ChannelError> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(ChannelError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }
}
