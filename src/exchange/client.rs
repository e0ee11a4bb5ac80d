//! REST client for the Coinbase Pro public market data endpoints

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RestConfig;
use crate::error::{MarketDataError, Result};
use crate::parser::{Product, RawSnapshot, Ticker};

const USER_AGENT: &str = concat!("cbpro-market-data/", env!("CARGO_PKG_VERSION"));

/// Public REST client; cheap to clone
#[derive(Debug, Clone)]
pub struct ExchangeClient {
    http: Client,
    endpoint: String,
    ticker_max_attempts: u32,
    ticker_retry_delay: Duration,
}

impl ExchangeClient {
    /// Create a new REST client
    pub fn new(config: &RestConfig) -> Result<Self> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            ticker_max_attempts: config.ticker_max_attempts.max(1),
            ticker_retry_delay: config.ticker_retry_delay,
        })
    }

    /// Delay between ticker attempts, also used to pace ticker requests
    pub fn ticker_retry_delay(&self) -> Duration {
        self.ticker_retry_delay
    }

    /// List all products. Any non-success status is an error.
    pub async fn products(&self) -> Result<Vec<Product>> {
        let url = format!("{}/products", self.endpoint);
        self.get_json(&url, "active Coinbase Pro markets").await
    }

    /// Fetch the ticker for one product
    ///
    /// Retries only on 429, up to the configured number of attempts with a
    /// fixed delay in between. Any other non-success status fails at once.
    pub async fn ticker(&self, product_id: &str) -> Result<Ticker> {
        let url = format!("{}/products/{}/ticker", self.endpoint, product_id);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let response = self.http.get(&url).send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response.json::<Ticker>().await?);
            }

            if status != StatusCode::TOO_MANY_REQUESTS || attempt >= self.ticker_max_attempts {
                return Err(MarketDataError::Fetch {
                    what: format!("ticker for {} on Coinbase Pro", product_id),
                    status: status.as_u16(),
                });
            }

            warn!(
                product_id = %product_id,
                attempt,
                max_attempts = self.ticker_max_attempts,
                "Ticker request rate limited, retrying"
            );
            sleep(self.ticker_retry_delay).await;
        }
    }

    /// Fetch the full level 3 order book for one product. No retry.
    pub async fn snapshot(&self, product_id: &str) -> Result<RawSnapshot> {
        let url = format!("{}/products/{}/book?level=3", self.endpoint, product_id);
        self.get_json(&url, &format!("Coinbase Pro market snapshot for {}", product_id))
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(MarketDataError::Fetch {
                what: what.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.json::<T>().await?)
    }
}
