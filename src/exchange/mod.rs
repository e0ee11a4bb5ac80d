//! Exchange module: REST access and market discovery

mod cache;
mod client;
mod markets;
mod pairs;

pub use cache::SingleFlightCache;
pub use client::ExchangeClient;
pub use markets::{rank_markets, CrossRates, MarketDirectory, MarketInfo};
pub use pairs::TradingPairs;
