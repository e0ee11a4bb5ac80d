//! Active market discovery and USD volume ranking

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::cache::SingleFlightCache;
use super::ExchangeClient;
use crate::error::Result;
use crate::parser::{Product, Ticker};

/// Quote currencies treated as USD
const USD_QUOTES: [&str; 7] = ["USD", "USDC", "USDS", "DAI", "PAX", "TUSD", "USDT"];

/// One tradable product with its derived 24h USD volume
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketInfo {
    pub product_id: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub volume: Option<Decimal>,
    pub price: Option<Decimal>,
    /// `None` when the quote currency has no known USD conversion
    pub usd_volume: Option<Decimal>,
}

impl MarketInfo {
    pub fn new(product: Product, ticker: Ticker) -> Self {
        Self {
            product_id: product.id,
            base_asset: product.base_currency,
            quote_asset: product.quote_currency,
            volume: ticker.volume,
            price: ticker.price,
            usd_volume: None,
        }
    }
}

/// USD cross rates read off the reference pairs of one batch
#[derive(Debug, Clone, Default)]
pub struct CrossRates {
    pub btc_usd: Option<Decimal>,
    pub eth_usd: Option<Decimal>,
    pub btc_eur: Option<Decimal>,
    pub btc_gbp: Option<Decimal>,
}

impl CrossRates {
    pub fn from_markets(markets: &[MarketInfo]) -> Self {
        let prices: HashMap<&str, Decimal> = markets
            .iter()
            .filter_map(|m| m.price.map(|p| (m.product_id.as_str(), p)))
            .collect();

        Self {
            btc_usd: prices.get("BTC-USD").copied(),
            eth_usd: prices.get("ETH-USD").copied(),
            btc_eur: prices.get("BTC-EUR").copied(),
            btc_gbp: prices.get("BTC-GBP").copied(),
        }
    }

    /// USD value of one unit of `quote`, if there is a conversion path.
    ///
    /// EUR and GBP go through the BTC cross rate only.
    pub fn usd_per_unit(&self, quote: &str) -> Option<Decimal> {
        match quote {
            q if USD_QUOTES.contains(&q) => Some(Decimal::ONE),
            "BTC" => self.btc_usd,
            "ETH" => self.eth_usd,
            "EUR" => self.btc_usd?.checked_div(self.btc_eur?),
            "GBP" => self.btc_usd?.checked_div(self.btc_gbp?),
            _ => None,
        }
    }
}

/// Fill in USD volumes and sort by descending USD volume, undefined last.
pub fn rank_markets(mut markets: Vec<MarketInfo>) -> Vec<MarketInfo> {
    let rates = CrossRates::from_markets(&markets);

    for market in &mut markets {
        let Some(rate) = rates.usd_per_unit(&market.quote_asset) else {
            error!(
                product_id = %market.product_id,
                "Unable to convert volume to USD for market"
            );
            continue;
        };

        market.usd_volume = match (market.volume, market.price) {
            (Some(volume), Some(price)) => volume
                .checked_mul(price)
                .and_then(|quote_volume| quote_volume.checked_mul(rate)),
            _ => None,
        };
        if market.usd_volume.is_none() {
            warn!(product_id = %market.product_id, "Ticker is missing price or volume");
        }
    }

    markets.sort_by(|a, b| b.usd_volume.cmp(&a.usd_volume));
    markets
}

/// Ranked view of the exchange's markets, cached with a validity window
pub struct MarketDirectory {
    client: ExchangeClient,
    cache: SingleFlightCache<Arc<Vec<MarketInfo>>>,
}

impl MarketDirectory {
    pub fn new(client: ExchangeClient, ttl: Duration) -> Self {
        Self {
            client,
            cache: SingleFlightCache::new(ttl),
        }
    }

    /// Active markets sorted by descending USD volume
    ///
    /// Served from cache while valid; concurrent callers during a refresh
    /// share the same fetch. A failed product listing or ticker fetch fails
    /// the whole refresh.
    pub async fn active_markets(&self) -> Result<Arc<Vec<MarketInfo>>> {
        let client = self.client.clone();
        self.cache
            .get_or_refresh(move || async move {
                fetch_active_markets(&client).await.map(Arc::new)
            })
            .await
    }
}

async fn fetch_active_markets(client: &ExchangeClient) -> Result<Vec<MarketInfo>> {
    let products = client.products().await?;
    info!(count = products.len(), "Fetched Coinbase Pro products");

    let mut markets = Vec::with_capacity(products.len());
    for product in products {
        let ticker = client.ticker(&product.id).await?;
        markets.push(MarketInfo::new(product, ticker));
        sleep(client.ticker_retry_delay()).await;
    }

    let ranked = rank_markets(markets);
    info!(
        count = ranked.len(),
        top = ?ranked.first().map(|m| m.product_id.as_str()),
        "Ranked active markets by USD volume"
    );
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market(id: &str, volume: Decimal, price: Decimal) -> MarketInfo {
        let (base, quote) = id.split_once('-').unwrap();
        MarketInfo {
            product_id: id.to_string(),
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
            volume: Some(volume),
            price: Some(price),
            usd_volume: None,
        }
    }

    fn usd_volume_of(ranked: &[MarketInfo], id: &str) -> Option<Decimal> {
        ranked.iter().find(|m| m.product_id == id).unwrap().usd_volume
    }

    #[test]
    fn test_usd_quoted_volume() {
        let ranked = rank_markets(vec![
            market("BTC-USD", dec!(2), dec!(100)),
            market("BTC-USDC", dec!(3), dec!(100)),
        ]);
        assert_eq!(usd_volume_of(&ranked, "BTC-USD"), Some(dec!(200)));
        assert_eq!(usd_volume_of(&ranked, "BTC-USDC"), Some(dec!(300)));
    }

    #[test]
    fn test_cross_rate_conversions() {
        let ranked = rank_markets(vec![
            market("BTC-USD", dec!(1), dec!(10000)),
            market("ETH-USD", dec!(1), dec!(200)),
            market("BTC-EUR", dec!(1), dec!(8000)),
            market("BTC-GBP", dec!(1), dec!(5000)),
            market("LTC-BTC", dec!(100), dec!(0.01)),
            market("ZRX-ETH", dec!(1000), dec!(0.001)),
            market("ETH-EUR", dec!(10), dec!(160)),
            market("ETH-GBP", dec!(4), dec!(100)),
        ]);

        // 100 * 0.01 * 10000
        assert_eq!(usd_volume_of(&ranked, "LTC-BTC"), Some(dec!(10000)));
        // 1000 * 0.001 * 200
        assert_eq!(usd_volume_of(&ranked, "ZRX-ETH"), Some(dec!(200)));
        // 10 * 160 * (10000 / 8000)
        assert_eq!(usd_volume_of(&ranked, "ETH-EUR"), Some(dec!(2000)));
        // 4 * 100 * (10000 / 5000)
        assert_eq!(usd_volume_of(&ranked, "ETH-GBP"), Some(dec!(800)));
    }

    #[test]
    fn test_unknown_quote_is_undefined_and_last() {
        let ranked = rank_markets(vec![
            market("XRP-JPY", dec!(1000000), dec!(50)),
            market("BTC-USD", dec!(1), dec!(10)),
            market("ETH-USD", dec!(1), dec!(20)),
        ]);

        let order: Vec<&str> = ranked.iter().map(|m| m.product_id.as_str()).collect();
        assert_eq!(order, vec!["ETH-USD", "BTC-USD", "XRP-JPY"]);
        assert_eq!(usd_volume_of(&ranked, "XRP-JPY"), None);
    }

    #[test]
    fn test_missing_reference_pair_is_undefined() {
        let ranked = rank_markets(vec![
            market("BTC-USD", dec!(1), dec!(10000)),
            market("ETH-EUR", dec!(10), dec!(160)),
        ]);
        assert_eq!(usd_volume_of(&ranked, "ETH-EUR"), None);
        assert_eq!(ranked[0].product_id, "BTC-USD");
    }

    #[test]
    fn test_ranking_is_descending() {
        let ranked = rank_markets(vec![
            market("A-USD", dec!(10), dec!(1)),
            market("B-USD", dec!(100), dec!(1)),
            market("C-USD", dec!(50), dec!(1)),
        ]);

        let volumes: Vec<Option<Decimal>> = ranked.iter().map(|m| m.usd_volume).collect();
        assert_eq!(volumes, vec![Some(dec!(100)), Some(dec!(50)), Some(dec!(10))]);
    }
}
