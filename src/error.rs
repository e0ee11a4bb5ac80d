//! Error types for the market data handler

use thiserror::Error;

/// Market data handler errors
///
/// Every variant carries owned strings so a failed market refresh can be
/// handed to all callers waiting on the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    /// Frame without a `type` field, or with a type we do not know.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Explicit `error` frame pushed by the exchange.
    #[error("Exchange sent error message: {0}")]
    ExchangeError(String),

    #[error("Error fetching {what}. HTTP status is {status}.")]
    Fetch { what: String, status: u16 },

    #[error("REST API error: {0}")]
    RestApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Output channel closed")]
    ChannelClosed,
}

impl MarketDataError {
    /// Liveness failures reconnect right away; everything else waits out the cooldown.
    pub fn is_liveness_failure(&self) -> bool {
        matches!(
            self,
            MarketDataError::ConnectionTimeout | MarketDataError::ConnectionClosed
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for MarketDataError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::error::ProtocolError;
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Io(_)
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                MarketDataError::ConnectionClosed
            }
            other => MarketDataError::WebSocketMessage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        MarketDataError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for MarketDataError {
    fn from(err: reqwest::Error) -> Self {
        MarketDataError::RestApiError(err.to_string())
    }
}

impl From<config::ConfigError> for MarketDataError {
    fn from(err: config::ConfigError) -> Self {
        MarketDataError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketDataError>;
