//! Canonical order book messages handed to the downstream engine
//!
//! Both feeds speak these types: the diff listener emits [`DiffMessage`],
//! the tracking entry builder and the snapshot refresher emit
//! [`SnapshotMessage`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::parser::{OrderSide, RawSnapshot, SnapshotRow};

/// Full order book snapshot for one product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMessage {
    pub product_id: String,
    /// Local time the snapshot was received
    pub timestamp: DateTime<Utc>,
    /// Exchange sequence the snapshot is consistent with
    pub sequence: u64,
    pub bids: Vec<SnapshotRow>,
    pub asks: Vec<SnapshotRow>,
}

impl SnapshotMessage {
    /// Stamp a raw REST snapshot with its product and receive time.
    ///
    /// The REST payload does not name its product, so the caller supplies it.
    pub fn from_exchange(raw: RawSnapshot, product_id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            product_id: product_id.to_string(),
            timestamp,
            sequence: raw.sequence,
            bids: raw.bids,
            asks: raw.asks,
        }
    }
}

/// Incremental order book event from the full channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffMessage {
    /// Carried in the payload because the feed does not tag frames by channel
    pub product_id: String,
    pub sequence: u64,
    pub time: DateTime<Utc>,
    pub side: OrderSide,
    pub event: DiffEvent,
}

impl DiffMessage {
    pub fn kind(&self) -> &'static str {
        match self.event {
            DiffEvent::Open { .. } => "open",
            DiffEvent::Match { .. } => "match",
            DiffEvent::Change { .. } => "change",
            DiffEvent::Done { .. } => "done",
        }
    }
}

/// Kind-specific payload of a [`DiffMessage`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DiffEvent {
    /// Order is now resting on the book
    Open {
        order_id: String,
        price: Decimal,
        remaining_size: Decimal,
    },
    /// Trade between a resting maker and an incoming taker
    Match {
        trade_id: u64,
        maker_order_id: String,
        taker_order_id: String,
        price: Decimal,
        size: Decimal,
    },
    /// Resting order changed size
    Change {
        order_id: String,
        price: Option<Decimal>,
        old_size: Option<Decimal>,
        new_size: Option<Decimal>,
    },
    /// Order left the book (filled or canceled)
    Done {
        order_id: String,
        price: Decimal,
        remaining_size: Option<Decimal>,
        reason: String,
    },
}
