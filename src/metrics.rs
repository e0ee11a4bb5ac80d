//! Prometheus counters for the ingestion tasks

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;
use tracing::warn;

pub struct FeedMetrics {
    /// Diff messages enqueued, by event kind
    pub diffs_enqueued: IntCounterVec,
    /// Frames that were valid but carried nothing for the book
    pub frames_ignored: IntCounter,
    /// Session restarts, by reason (`liveness`, `cooldown`)
    pub reconnects: IntCounterVec,
    pub snapshots_published: IntCounter,
    pub snapshot_failures: IntCounter,
}

impl FeedMetrics {
    fn new() -> prometheus::Result<Self> {
        Ok(Self {
            diffs_enqueued: IntCounterVec::new(
                Opts::new("cbpro_diffs_enqueued_total", "Diff messages enqueued"),
                &["kind"],
            )?,
            frames_ignored: IntCounter::new(
                "cbpro_frames_ignored_total",
                "Feed frames dropped without output",
            )?,
            reconnects: IntCounterVec::new(
                Opts::new("cbpro_reconnects_total", "WebSocket session restarts"),
                &["reason"],
            )?,
            snapshots_published: IntCounter::new(
                "cbpro_snapshots_published_total",
                "Periodic snapshots enqueued",
            )?,
            snapshot_failures: IntCounter::new(
                "cbpro_snapshot_failures_total",
                "Periodic snapshot fetch failures",
            )?,
        })
    }

    fn register(&self, registry: &Registry) {
        let collectors: [Box<dyn prometheus::core::Collector>; 5] = [
            Box::new(self.diffs_enqueued.clone()),
            Box::new(self.frames_ignored.clone()),
            Box::new(self.reconnects.clone()),
            Box::new(self.snapshots_published.clone()),
            Box::new(self.snapshot_failures.clone()),
        ];
        for collector in collectors {
            if let Err(e) = registry.register(collector) {
                warn!(error = %e, "Failed to register metric");
            }
        }
    }
}

/// Process-wide counters, registered on the default registry on first use
///
/// Returns `None` only if the metric definitions themselves are invalid.
pub fn feed_metrics() -> Option<&'static FeedMetrics> {
    static METRICS: OnceLock<Option<FeedMetrics>> = OnceLock::new();

    METRICS
        .get_or_init(|| match FeedMetrics::new() {
            Ok(metrics) => {
                metrics.register(prometheus::default_registry());
                Some(metrics)
            }
            Err(e) => {
                warn!(error = %e, "Failed to create feed metrics");
                None
            }
        })
        .as_ref()
}
