//! Summary statistics over a book's levels

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Level;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBookMetrics {
    pub mid_price: Option<Decimal>,
    /// Best ask minus best bid, in basis points of mid
    pub spread_bps: Option<Decimal>,
    /// (bid_vol - ask_vol) / (bid_vol + ask_vol) over the top levels
    pub imbalance: Option<Decimal>,
    pub bid_depth: Decimal,
    pub ask_depth: Decimal,
    pub bid_levels: usize,
    pub ask_levels: usize,
}

impl OrderBookMetrics {
    /// Metrics for levels ordered best first
    pub fn compute(bids: &[Level], asks: &[Level], imbalance_levels: usize) -> Self {
        let best = bids.first().zip(asks.first());
        let top_volume =
            |levels: &[Level]| levels.iter().take(imbalance_levels).map(|l| l.quantity).sum();

        Self {
            mid_price: best.and_then(|(bid, ask)| Self::mid(bid.price, ask.price)),
            spread_bps: best.and_then(|(bid, ask)| Self::spread(bid.price, ask.price)),
            imbalance: Self::volume_imbalance(top_volume(bids), top_volume(asks)),
            bid_depth: bids.iter().map(|l| l.quantity).sum(),
            ask_depth: asks.iter().map(|l| l.quantity).sum(),
            bid_levels: bids.len(),
            ask_levels: asks.len(),
        }
    }

    pub fn mid(bid: Decimal, ask: Decimal) -> Option<Decimal> {
        (bid + ask).checked_div(Decimal::TWO)
    }

    pub fn spread(bid: Decimal, ask: Decimal) -> Option<Decimal> {
        let mid = Self::mid(bid, ask).filter(|mid| *mid > Decimal::ZERO)?;
        ((ask - bid) / mid).checked_mul(Decimal::from(10_000))
    }

    pub fn volume_imbalance(bid_volume: Decimal, ask_volume: Decimal) -> Option<Decimal> {
        let total = bid_volume + ask_volume;
        if total > Decimal::ZERO {
            Some((bid_volume - ask_volume) / total)
        } else {
            None
        }
    }

    /// Two-sided and not crossed
    pub fn is_healthy(&self) -> bool {
        self.bid_levels > 0
            && self.ask_levels > 0
            && self.spread_bps.map_or(false, |spread| spread >= Decimal::ZERO)
    }
}
