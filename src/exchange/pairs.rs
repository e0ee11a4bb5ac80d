//! Trading pair selection

use std::sync::Arc;

use super::MarketDirectory;
use crate::error::Result;

/// Where the set of subscribed products comes from
///
/// Every consumer resolves the list at its own well-defined points
/// (each reconnect, each snapshot pass), so a new ranking takes effect
/// on the next cycle rather than mid-session.
#[derive(Clone)]
pub enum TradingPairs {
    /// Externally supplied, never changes
    Fixed(Arc<Vec<String>>),
    /// Ranked discovery through the market directory
    Discovered(Arc<MarketDirectory>),
}

impl TradingPairs {
    pub fn fixed<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TradingPairs::Fixed(Arc::new(pairs.into_iter().map(Into::into).collect()))
    }

    /// Fixed pairs when configured, discovery otherwise
    pub fn from_config(pairs: Option<Vec<String>>, directory: Arc<MarketDirectory>) -> Self {
        match pairs {
            Some(pairs) => TradingPairs::Fixed(Arc::new(pairs)),
            None => TradingPairs::Discovered(directory),
        }
    }

    /// Current trading pair list
    pub async fn resolve(&self) -> Result<Vec<String>> {
        match self {
            TradingPairs::Fixed(pairs) => Ok(pairs.as_ref().clone()),
            TradingPairs::Discovered(directory) => Ok(directory
                .active_markets()
                .await?
                .iter()
                .map(|market| market.product_id.clone())
                .collect()),
        }
    }
}
