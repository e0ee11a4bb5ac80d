//! Aggregated price-level book
//!
//! Levels carry the sequence of the update that last set them, so a row
//! older than the level it targets is dropped.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{BookRow, Level, OrderBookMetrics, OrderBookState};

const IMBALANCE_LEVELS: usize = 5;

#[derive(Debug, Clone, Copy)]
struct LevelEntry {
    amount: Decimal,
    update_id: u64,
}

/// Set or clear one level; zero amount removes it
fn write_level<K: Ord>(levels: &mut BTreeMap<K, LevelEntry>, key: K, row: &BookRow) {
    if levels
        .get(&key)
        .is_some_and(|entry| entry.update_id > row.update_id)
    {
        return;
    }
    if row.amount <= Decimal::ZERO {
        levels.remove(&key);
    } else {
        levels.insert(
            key,
            LevelEntry {
                amount: row.amount,
                update_id: row.update_id,
            },
        );
    }
}

/// Price-level book for a single product
#[derive(Debug, Clone)]
pub struct OrderBook {
    product_id: String,
    /// Highest price first
    bids: BTreeMap<Reverse<Decimal>, LevelEntry>,
    /// Lowest price first
    asks: BTreeMap<Decimal, LevelEntry>,
    last_update_id: u64,
    initialized: bool,
}

impl OrderBook {
    pub fn new(product_id: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
            initialized: false,
        }
    }

    /// Replace the book contents with snapshot rows
    pub fn apply_snapshot(&mut self, bids: &[BookRow], asks: &[BookRow], update_id: u64) {
        self.bids.clear();
        self.asks.clear();
        self.write_rows(bids, asks);
        self.last_update_id = update_id;
        self.initialized = true;
    }

    /// Apply the levels changed by one diff
    ///
    /// Returns false if the book has no snapshot yet or `update_id` is not
    /// past the last applied sequence.
    pub fn apply_diffs(&mut self, bids: &[BookRow], asks: &[BookRow], update_id: u64) -> bool {
        if !self.initialized || update_id <= self.last_update_id {
            return false;
        }
        self.write_rows(bids, asks);
        self.last_update_id = update_id;
        true
    }

    fn write_rows(&mut self, bids: &[BookRow], asks: &[BookRow]) {
        for row in bids {
            write_level(&mut self.bids, Reverse(row.price), row);
        }
        for row in asks {
            write_level(&mut self.asks, row.price, row);
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|Reverse(price)| *price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Volume imbalance over the top `levels` of each side, in [-1, 1]
    pub fn imbalance(&self, levels: usize) -> Option<Decimal> {
        OrderBookMetrics::volume_imbalance(
            self.bid_levels(levels).iter().map(|l| l.quantity).sum(),
            self.ask_levels(levels).iter().map(|l| l.quantity).sum(),
        )
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    fn bid_levels(&self, depth: usize) -> Vec<Level> {
        self.bids
            .iter()
            .take(depth)
            .map(|(Reverse(price), entry)| Level {
                price: *price,
                quantity: entry.amount,
            })
            .collect()
    }

    fn ask_levels(&self, depth: usize) -> Vec<Level> {
        self.asks
            .iter()
            .take(depth)
            .map(|(price, entry)| Level {
                price: *price,
                quantity: entry.amount,
            })
            .collect()
    }

    /// Top `depth` levels per side plus whole-book metrics
    pub fn state(&self, depth: usize) -> OrderBookState {
        let all_bids = self.bid_levels(usize::MAX);
        let all_asks = self.ask_levels(usize::MAX);
        let metrics = OrderBookMetrics::compute(&all_bids, &all_asks, IMBALANCE_LEVELS);

        OrderBookState {
            product_id: self.product_id.clone(),
            last_update_id: self.last_update_id,
            bids: all_bids.into_iter().take(depth).collect(),
            asks: all_asks.into_iter().take(depth).collect(),
            metrics,
        }
    }
}
