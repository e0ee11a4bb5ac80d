//! Order book manager
//!
//! Owns the tracking entries after hand-off and reconciles both feeds
//! against them by exchange sequence.

use std::collections::HashMap;
use tracing::debug;

use super::OrderBookState;
use crate::messages::{DiffMessage, SnapshotMessage};
use crate::tracking::TrackingEntry;

/// Manages order books for multiple products
#[derive(Debug, Default)]
pub struct OrderBookManager {
    entries: HashMap<String, TrackingEntry>,
}

impl OrderBookManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of entries built at startup
    pub fn with_entries(entries: HashMap<String, TrackingEntry>) -> Self {
        Self { entries }
    }

    /// Apply a diff to its product's book
    ///
    /// Diffs for unknown products or at/below the book's sequence are skipped.
    pub fn apply_diff(&mut self, diff: &DiffMessage) -> bool {
        let Some(entry) = self.entries.get_mut(&diff.product_id) else {
            return false;
        };
        if diff.sequence <= entry.order_book.last_update_id() {
            debug!(
                product_id = %diff.product_id,
                sequence = diff.sequence,
                book_sequence = entry.order_book.last_update_id(),
                "Skipping stale diff"
            );
            return false;
        }

        let (bids, asks) = entry.tracker.convert_diff(diff);
        entry.order_book.apply_diffs(&bids, &asks, diff.sequence)
    }

    /// Replace a product's book with a newer snapshot
    pub fn apply_snapshot(&mut self, snapshot: &SnapshotMessage) -> bool {
        if let Some(entry) = self.entries.get(&snapshot.product_id) {
            if snapshot.sequence <= entry.order_book.last_update_id() {
                debug!(
                    product_id = %snapshot.product_id,
                    sequence = snapshot.sequence,
                    "Skipping stale snapshot"
                );
                return false;
            }
        }

        self.entries.insert(
            snapshot.product_id.clone(),
            TrackingEntry::from_snapshot(snapshot),
        );
        true
    }

    /// Get the state of a specific book
    pub fn get_state(&self, product_id: &str, depth: usize) -> Option<OrderBookState> {
        self.entries
            .get(product_id)
            .map(|entry| entry.order_book.state(depth))
    }

    pub fn last_update_id(&self, product_id: &str) -> Option<u64> {
        self.entries
            .get(product_id)
            .map(|entry| entry.order_book.last_update_id())
    }

    /// Get list of products being tracked
    pub fn product_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::DiffEvent;
    use crate::parser::{OrderSide, SnapshotRow};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn snapshot(sequence: u64, bid_size: rust_decimal::Decimal) -> SnapshotMessage {
        SnapshotMessage {
            product_id: "BTC-USD".into(),
            timestamp: Utc::now(),
            sequence,
            bids: vec![SnapshotRow {
                price: dec!(100),
                size: bid_size,
                order_id: "b1".into(),
            }],
            asks: vec![],
        }
    }

    fn open(sequence: u64) -> DiffMessage {
        DiffMessage {
            product_id: "BTC-USD".into(),
            sequence,
            time: Utc::now(),
            side: OrderSide::Buy,
            event: DiffEvent::Open {
                order_id: format!("o{}", sequence),
                price: dec!(100),
                remaining_size: dec!(1),
            },
        }
    }

    #[test]
    fn test_diffs_apply_in_sequence() {
        let mut manager = OrderBookManager::new();
        assert!(manager.apply_snapshot(&snapshot(10, dec!(1))));

        assert!(!manager.apply_diff(&open(9)));
        assert!(manager.apply_diff(&open(11)));
        assert_eq!(manager.last_update_id("BTC-USD"), Some(11));
        assert_eq!(
            manager.get_state("BTC-USD", 5).unwrap().bids[0].quantity,
            dec!(2)
        );
    }

    #[test]
    fn test_stale_snapshot_is_ignored() {
        let mut manager = OrderBookManager::new();
        manager.apply_snapshot(&snapshot(10, dec!(1)));

        assert!(!manager.apply_snapshot(&snapshot(10, dec!(5))));
        assert!(manager.apply_snapshot(&snapshot(20, dec!(5))));
        assert_eq!(
            manager.get_state("BTC-USD", 5).unwrap().bids[0].quantity,
            dec!(5)
        );
    }

    #[test]
    fn test_unknown_product_diff_is_skipped() {
        let mut manager = OrderBookManager::new();
        assert!(!manager.apply_diff(&open(1)));
        assert!(manager.is_empty());
    }
}
