//! Coinbase Pro market-data ingestion
//!
//! Discovers active markets, builds initial order-book tracking entries from
//! REST snapshots, streams full-channel diffs over WebSocket and re-polls
//! snapshots hourly so downstream books can reconcile.

use std::sync::Arc;
use tokio::sync::{watch, RwLock};

pub mod config;
pub mod error;
pub mod exchange;
pub mod messages;
pub mod metrics;
pub mod orderbook;
pub mod parser;
pub mod refresher;
pub mod tracking;
pub mod websocket;

pub use config::Config;
pub use error::{MarketDataError, Result};
pub use exchange::{ExchangeClient, MarketDirectory, MarketInfo, TradingPairs};
pub use messages::{DiffEvent, DiffMessage, SnapshotMessage};
pub use orderbook::{OrderBook, OrderBookManager, OrderBookMetrics, OrderBookState};
pub use refresher::SnapshotRefresher;
pub use tracking::{TrackingEntry, TrackingEntryBuilder};
pub use websocket::{DiffListener, ListenerState, WebSocketConnector};

/// Application state shared across components
pub struct AppState {
    pub orderbook_manager: Arc<RwLock<OrderBookManager>>,
    pub config: Arc<Config>,
    pub listener_state: watch::Receiver<ListenerState>,
}
