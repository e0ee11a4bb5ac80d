//! Periodic snapshot refresher
//!
//! Re-polls full snapshots for every trading pair once an hour so the
//! downstream books can heal from drift in the diff stream.

use chrono::{DateTime, DurationRound, Utc};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::RefresherConfig;
use crate::error::{MarketDataError, Result};
use crate::exchange::{ExchangeClient, TradingPairs};
use crate::messages::SnapshotMessage;
use crate::metrics::feed_metrics;

pub struct SnapshotRefresher {
    client: ExchangeClient,
    pairs: TradingPairs,
    output: UnboundedSender<SnapshotMessage>,
    config: RefresherConfig,
}

impl SnapshotRefresher {
    pub fn new(
        client: ExchangeClient,
        pairs: TradingPairs,
        output: UnboundedSender<SnapshotMessage>,
        config: RefresherConfig,
    ) -> Self {
        Self {
            client,
            pairs,
            output,
            config,
        }
    }

    /// Refresh until `shutdown` is cancelled
    ///
    /// Returns [`MarketDataError::ChannelClosed`] if the output receiver goes away.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting snapshot refresher");

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Snapshot refresher cancelled");
                Ok(())
            }
            result = self.run_forever() => result,
        }
    }

    async fn run_forever(&self) -> Result<()> {
        loop {
            match self.refresh_pass().await {
                Ok(()) => {
                    let wait = until_next_hour(Utc::now());
                    debug!(wait_secs = wait.as_secs(), "Snapshot pass complete");
                    sleep(wait).await;
                }
                Err(MarketDataError::ChannelClosed) => {
                    return Err(MarketDataError::ChannelClosed);
                }
                Err(e) => {
                    error!(error = %e, "Unexpected error refreshing snapshots");
                    sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    /// Fetch and enqueue one snapshot per trading pair
    ///
    /// Per-pair failures are logged and skipped; only pair resolution and a
    /// closed output fail the pass.
    pub async fn refresh_pass(&self) -> Result<()> {
        let pairs = self.pairs.resolve().await?;

        for product_id in &pairs {
            match self.client.snapshot(product_id).await {
                Ok(raw) => {
                    let snapshot = SnapshotMessage::from_exchange(raw, product_id, Utc::now());
                    self.output
                        .send(snapshot)
                        .map_err(|_| MarketDataError::ChannelClosed)?;
                    if let Some(metrics) = feed_metrics() {
                        metrics.snapshots_published.inc();
                    }
                    debug!(product_id = %product_id, "Saved order book snapshot");
                    sleep(self.config.pacing).await;
                }
                Err(e) => {
                    if let Some(metrics) = feed_metrics() {
                        metrics.snapshot_failures.inc();
                    }
                    error!(product_id = %product_id, error = %e, "Error refreshing snapshot");
                    sleep(self.config.failure_delay).await;
                }
            }
        }

        Ok(())
    }
}

/// Time left until the next top of the hour (UTC)
pub fn until_next_hour(now: DateTime<Utc>) -> Duration {
    let hour = chrono::Duration::hours(1);
    let this_hour = now.duration_trunc(hour).unwrap_or(now);
    (this_hour + hour - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_until_next_hour_mid_hour() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap();
        assert_eq!(until_next_hour(now), Duration::from_secs(44 * 60 + 30));
    }

    #[test]
    fn test_until_next_hour_on_the_hour() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(until_next_hour(now), Duration::from_secs(3600));
    }

    #[test]
    fn test_until_next_hour_crosses_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap();
        assert_eq!(until_next_hour(now), Duration::from_secs(1));
    }
}
