//! WebSocket module for the Coinbase Pro full channel
//!
//! The listener talks to the socket through [`FeedConnector`] and
//! [`FeedConnection`] so the session state machine can run against any
//! duplex transport.

mod client;
mod listener;

pub use client::{WebSocketClient, WebSocketConnector};
pub use listener::{DiffListener, ListenerState, SessionOutcome};

use async_trait::async_trait;

use crate::error::Result;

/// What one receive produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Text frame payload
    Text(String),
    /// Pong or other control frame; proves the peer is alive
    Control,
    /// Peer closed the connection
    Closed,
}

/// One live connection session
#[async_trait]
pub trait FeedConnection: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next inbound frame. Must be cancel safe.
    async fn recv(&mut self) -> Result<Inbound>;

    /// Send a liveness probe
    async fn ping(&mut self) -> Result<()>;

    /// Close the connection; safe to call more than once
    async fn close(&mut self);
}

/// Opens connection sessions
#[async_trait]
pub trait FeedConnector: Send + Sync {
    type Connection: FeedConnection;

    async fn connect(&self) -> Result<Self::Connection>;
}
