//! WebSocket client for the Coinbase Pro feed
//!
//! Handles connection, frame reception, keepalive pings and close.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use super::{FeedConnection, FeedConnector, Inbound};
use crate::error::{MarketDataError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens [`WebSocketClient`] sessions against one endpoint
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: String,
}

impl WebSocketConnector {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl FeedConnector for WebSocketConnector {
    type Connection = WebSocketClient;

    async fn connect(&self) -> Result<WebSocketClient> {
        WebSocketClient::connect(&self.endpoint).await
    }
}

/// WebSocket client for a single connection
pub struct WebSocketClient {
    stream: Option<WsStream>,
}

impl WebSocketClient {
    /// Connect to the WebSocket endpoint
    pub async fn connect(endpoint: &str) -> Result<Self> {
        info!(url = %endpoint, "Connecting to Coinbase Pro WebSocket");

        let (ws_stream, response) = connect_async(endpoint).await.map_err(|e| {
            MarketDataError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");
        Ok(Self {
            stream: Some(ws_stream),
        })
    }

    fn stream_mut(&mut self) -> Result<&mut WsStream> {
        self.stream.as_mut().ok_or(MarketDataError::ConnectionClosed)
    }
}

#[async_trait]
impl FeedConnection for WebSocketClient {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream_mut()?.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Inbound> {
        let stream = self.stream_mut()?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text message");
                Ok(Inbound::Text(text))
            }
            Some(Ok(Message::Binary(data))) => String::from_utf8(data)
                .map(Inbound::Text)
                .map_err(|e| MarketDataError::ParseError(format!("binary frame is not UTF-8: {}", e))),
            // Pings are answered by tungstenite on the next read or write
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                Ok(Inbound::Control)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                Ok(Inbound::Closed)
            }
            Some(Err(e)) => {
                let err = MarketDataError::from(e);
                if err.is_liveness_failure() {
                    warn!(error = %err, "WebSocket connection lost");
                    Ok(Inbound::Closed)
                } else {
                    Err(err)
                }
            }
            None => {
                warn!("WebSocket stream ended");
                Ok(Inbound::Closed)
            }
        }
    }

    async fn ping(&mut self) -> Result<()> {
        self.stream_mut()?.send(Message::Ping(Vec::new())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
