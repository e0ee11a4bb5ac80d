//! Initial order book state per product
//!
//! Builds one [`TrackingEntry`] per trading pair from a REST snapshot. The
//! entries are handed off by value; after that only the downstream engine
//! touches the book and tracker inside them.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use crate::error::Result;
use crate::exchange::{ExchangeClient, TradingPairs};
use crate::messages::SnapshotMessage;
use crate::orderbook::{ActiveOrderTracker, OrderBook};

/// Book plus order aggregation state for one product
#[derive(Debug, Clone)]
pub struct TrackingEntry {
    pub product_id: String,
    pub timestamp: DateTime<Utc>,
    pub order_book: OrderBook,
    pub tracker: ActiveOrderTracker,
}

impl TrackingEntry {
    /// Fresh tracker and book, both seeded from `snapshot`
    pub fn from_snapshot(snapshot: &SnapshotMessage) -> Self {
        let mut tracker = ActiveOrderTracker::new();
        let mut order_book = OrderBook::new(&snapshot.product_id);

        let (bids, asks) = tracker.convert_snapshot(snapshot);
        order_book.apply_snapshot(&bids, &asks, snapshot.sequence);

        Self {
            product_id: snapshot.product_id.clone(),
            timestamp: snapshot.timestamp,
            order_book,
            tracker,
        }
    }
}

/// Builds tracking entries one product at a time
pub struct TrackingEntryBuilder {
    client: ExchangeClient,
    pairs: TradingPairs,
    pacing: Duration,
}

impl TrackingEntryBuilder {
    pub fn new(client: ExchangeClient, pairs: TradingPairs, pacing: Duration) -> Self {
        Self {
            client,
            pairs,
            pacing,
        }
    }

    /// Resolve the trading pairs and build their entries
    ///
    /// Fails only when the pairs cannot be resolved.
    pub async fn tracking_entries(&self) -> Result<HashMap<String, TrackingEntry>> {
        let pairs = self.pairs.resolve().await?;
        Ok(self.build(&pairs).await)
    }

    /// Build entries sequentially, pausing between products
    ///
    /// A product whose snapshot cannot be fetched is logged and left out.
    pub async fn build(&self, product_ids: &[String]) -> HashMap<String, TrackingEntry> {
        let total = product_ids.len();
        let mut entries = HashMap::with_capacity(total);

        for (index, product_id) in product_ids.iter().enumerate() {
            match self.client.snapshot(product_id).await {
                Ok(raw) => {
                    let snapshot = SnapshotMessage::from_exchange(raw, product_id, Utc::now());
                    entries.insert(product_id.clone(), TrackingEntry::from_snapshot(&snapshot));
                    info!(
                        product_id = %product_id,
                        completed = index + 1,
                        total,
                        "Initialized order book"
                    );
                }
                Err(e) => {
                    error!(product_id = %product_id, error = %e, "Error getting snapshot");
                }
            }
            sleep(self.pacing).await;
        }

        entries
    }
}
