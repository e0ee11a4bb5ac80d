//! Active order tracking
//!
//! The full channel speaks in individual orders; the book wants aggregated
//! price levels. The tracker keeps every resting order by side and price
//! and reports the new aggregate for each level an event touches.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use super::BookRow;
use crate::messages::{DiffEvent, DiffMessage, SnapshotMessage};
use crate::parser::{OrderSide, SnapshotRow};

type Levels = BTreeMap<Decimal, HashMap<String, Decimal>>;

/// Resting orders of one product, grouped by price level
#[derive(Debug, Clone, Default)]
pub struct ActiveOrderTracker {
    bids: Levels,
    asks: Levels,
}

impl ActiveOrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset from a snapshot and return aggregated `(bids, asks)`
    ///
    /// Bids come out best (highest) first, asks lowest first.
    pub fn convert_snapshot(&mut self, snapshot: &SnapshotMessage) -> (Vec<BookRow>, Vec<BookRow>) {
        self.bids = Self::index_rows(&snapshot.bids);
        self.asks = Self::index_rows(&snapshot.asks);

        let update_id = snapshot.sequence;
        let bids = self
            .bids
            .iter()
            .rev()
            .map(|(price, orders)| Self::level_row(*price, orders, update_id))
            .collect();
        let asks = self
            .asks
            .iter()
            .map(|(price, orders)| Self::level_row(*price, orders, update_id))
            .collect();

        (bids, asks)
    }

    /// Apply one diff and return the changed `(bids, asks)` levels
    ///
    /// Events for orders the tracker never saw rest (e.g. `done` for an
    /// order that filled on arrival) change nothing.
    pub fn convert_diff(&mut self, diff: &DiffMessage) -> (Vec<BookRow>, Vec<BookRow>) {
        let levels = match diff.side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        };

        let touched = match &diff.event {
            DiffEvent::Open {
                order_id,
                price,
                remaining_size,
            } => {
                levels
                    .entry(*price)
                    .or_default()
                    .insert(order_id.clone(), *remaining_size);
                Some(*price)
            }
            DiffEvent::Done { order_id, price, .. } => {
                Self::remove_order(levels, *price, order_id).then_some(*price)
            }
            DiffEvent::Change {
                order_id,
                price: Some(price),
                new_size: Some(new_size),
                ..
            } => levels
                .get_mut(price)
                .and_then(|orders| orders.get_mut(order_id))
                .map(|size| {
                    *size = *new_size;
                    *price
                }),
            DiffEvent::Change { .. } => None,
            DiffEvent::Match {
                maker_order_id,
                price,
                size: traded,
                ..
            } => levels
                .get_mut(price)
                .and_then(|orders| orders.get_mut(maker_order_id))
                .map(|size| {
                    *size = (*size - *traded).max(Decimal::ZERO);
                    *price
                }),
        };

        let Some(price) = touched else {
            return (Vec::new(), Vec::new());
        };

        let amount = levels
            .get(&price)
            .map(|orders| orders.values().copied().sum())
            .unwrap_or(Decimal::ZERO);
        let row = vec![BookRow {
            price,
            amount,
            update_id: diff.sequence,
        }];

        match diff.side {
            OrderSide::Buy => (row, Vec::new()),
            OrderSide::Sell => (Vec::new(), row),
        }
    }

    /// Number of resting orders currently tracked
    pub fn active_orders(&self) -> usize {
        self.bids
            .values()
            .chain(self.asks.values())
            .map(HashMap::len)
            .sum()
    }

    fn index_rows(rows: &[SnapshotRow]) -> Levels {
        let mut levels = Levels::new();
        for row in rows {
            levels
                .entry(row.price)
                .or_default()
                .insert(row.order_id.clone(), row.size);
        }
        levels
    }

    fn remove_order(levels: &mut Levels, price: Decimal, order_id: &str) -> bool {
        let Some(orders) = levels.get_mut(&price) else {
            return false;
        };
        let removed = orders.remove(order_id).is_some();
        if orders.is_empty() {
            levels.remove(&price);
        }
        removed
    }

    fn level_row(price: Decimal, orders: &HashMap<String, Decimal>, update_id: u64) -> BookRow {
        BookRow {
            price,
            amount: orders.values().copied().sum(),
            update_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn order(price: Decimal, size: Decimal, id: &str) -> SnapshotRow {
        SnapshotRow {
            price,
            size,
            order_id: id.to_string(),
        }
    }

    fn snapshot() -> SnapshotMessage {
        SnapshotMessage {
            product_id: "BTC-USD".into(),
            timestamp: Utc::now(),
            sequence: 100,
            bids: vec![
                order(dec!(99), dec!(1), "b1"),
                order(dec!(100), dec!(2), "b2"),
                order(dec!(100), dec!(3), "b3"),
            ],
            asks: vec![order(dec!(101), dec!(4), "a1")],
        }
    }

    fn diff(sequence: u64, side: OrderSide, event: DiffEvent) -> DiffMessage {
        DiffMessage {
            product_id: "BTC-USD".into(),
            sequence,
            time: Utc::now(),
            side,
            event,
        }
    }

    #[test]
    fn test_snapshot_aggregates_levels() {
        let mut tracker = ActiveOrderTracker::new();
        let (bids, asks) = tracker.convert_snapshot(&snapshot());

        assert_eq!(bids.len(), 2);
        assert_eq!((bids[0].price, bids[0].amount), (dec!(100), dec!(5)));
        assert_eq!((bids[1].price, bids[1].amount), (dec!(99), dec!(1)));
        assert_eq!(asks[0].update_id, 100);
        assert_eq!(tracker.active_orders(), 4);
    }

    #[test]
    fn test_open_then_done() {
        let mut tracker = ActiveOrderTracker::new();
        tracker.convert_snapshot(&snapshot());

        let (_, asks) = tracker.convert_diff(&diff(
            101,
            OrderSide::Sell,
            DiffEvent::Open {
                order_id: "a2".into(),
                price: dec!(101),
                remaining_size: dec!(0.5),
            },
        ));
        assert_eq!(asks[0].amount, dec!(4.5));

        let (_, asks) = tracker.convert_diff(&diff(
            102,
            OrderSide::Sell,
            DiffEvent::Done {
                order_id: "a1".into(),
                price: dec!(101),
                remaining_size: Some(dec!(0)),
                reason: "canceled".into(),
            },
        ));
        assert_eq!((asks[0].amount, asks[0].update_id), (dec!(0.5), 102));
    }

    #[test]
    fn test_match_reduces_maker() {
        let mut tracker = ActiveOrderTracker::new();
        tracker.convert_snapshot(&snapshot());

        let (bids, asks) = tracker.convert_diff(&diff(
            101,
            OrderSide::Buy,
            DiffEvent::Match {
                trade_id: 1,
                maker_order_id: "b2".into(),
                taker_order_id: "t1".into(),
                price: dec!(100),
                size: dec!(1.5),
            },
        ));
        assert!(asks.is_empty());
        assert_eq!(bids[0].amount, dec!(3.5));
    }

    #[test]
    fn test_change_resizes_order() {
        let mut tracker = ActiveOrderTracker::new();
        tracker.convert_snapshot(&snapshot());

        let (bids, _) = tracker.convert_diff(&diff(
            101,
            OrderSide::Buy,
            DiffEvent::Change {
                order_id: "b1".into(),
                price: Some(dec!(99)),
                old_size: Some(dec!(1)),
                new_size: Some(dec!(0.25)),
            },
        ));
        assert_eq!(bids[0].amount, dec!(0.25));
    }

    #[test]
    fn test_done_for_unknown_order_changes_nothing() {
        let mut tracker = ActiveOrderTracker::new();
        tracker.convert_snapshot(&snapshot());

        let (bids, asks) = tracker.convert_diff(&diff(
            101,
            OrderSide::Buy,
            DiffEvent::Done {
                order_id: "never-rested".into(),
                price: dec!(100),
                remaining_size: None,
                reason: "filled".into(),
            },
        ));
        assert!(bids.is_empty() && asks.is_empty());
        assert_eq!(tracker.active_orders(), 4);
    }

    #[test]
    fn test_last_order_done_empties_level() {
        let mut tracker = ActiveOrderTracker::new();
        tracker.convert_snapshot(&snapshot());

        let (bids, _) = tracker.convert_diff(&diff(
            101,
            OrderSide::Buy,
            DiffEvent::Done {
                order_id: "b1".into(),
                price: dec!(99),
                remaining_size: None,
                reason: "canceled".into(),
            },
        ));
        assert_eq!(bids[0].amount, Decimal::ZERO);
    }
}
