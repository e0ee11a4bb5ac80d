//! Order book module
//!
//! Reference downstream state: level 3 orders are aggregated by the
//! [`ActiveOrderTracker`] into price levels held by the [`OrderBook`].

mod book;
mod manager;
mod metrics;
mod tracker;

pub use book::OrderBook;
pub use manager::OrderBookManager;
pub use metrics::OrderBookMetrics;
pub use tracker::ActiveOrderTracker;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregated size at one price, stamped with the update that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookRow {
    pub price: Decimal,
    pub amount: Decimal,
    pub update_id: u64,
}

/// Price level as reported in [`OrderBookState`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Point-in-time view of a book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookState {
    pub product_id: String,
    pub last_update_id: u64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub metrics: OrderBookMetrics,
}
