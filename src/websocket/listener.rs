//! Streaming diff listener
//!
//! Runs connection sessions forever: resolve pairs, connect, subscribe to
//! the full channel, translate frames into [`DiffMessage`]s. Peer closes and
//! dead connections restart at once; every other failure restarts after a
//! cooldown. Only cancellation (or a dropped consumer) ends the loop.

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{FeedConnection, FeedConnector, Inbound};
use crate::config::ListenerConfig;
use crate::error::{MarketDataError, Result};
use crate::exchange::TradingPairs;
use crate::messages::DiffMessage;
use crate::metrics::feed_metrics;
use crate::parser::{FeedMessage, SubscribeRequest};

/// Where the listener is in its connection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Subscribed,
    Receiving,
    ReconnectWait,
}

/// How a connection session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Peer closed or stopped answering; reconnect with no delay
    ReconnectNow,
    /// Parse, protocol or transport failure; wait out the cooldown first
    ReconnectAfterCooldown,
    /// Nobody is consuming the output anymore
    Terminate,
}

/// Per-frame result inside a session
enum FrameOutcome {
    Continue,
    End(SessionOutcome),
}

pub struct DiffListener<C: FeedConnector> {
    connector: C,
    pairs: TradingPairs,
    output: UnboundedSender<DiffMessage>,
    config: ListenerConfig,
    state: watch::Sender<ListenerState>,
}

impl<C: FeedConnector> DiffListener<C> {
    pub fn new(
        connector: C,
        pairs: TradingPairs,
        output: UnboundedSender<DiffMessage>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            connector,
            pairs,
            output,
            config,
            state: watch::channel(ListenerState::Disconnected).0,
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Follow state transitions from another task
    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ListenerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Listener state changed");
        }
    }

    /// Listen until `shutdown` is cancelled
    ///
    /// Cancellation drops the current session, which closes its socket.
    /// Returns [`MarketDataError::ChannelClosed`] if the output receiver
    /// goes away.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting diff listener");

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Diff listener cancelled");
                self.set_state(ListenerState::Disconnected);
                Ok(())
            }
            result = self.run_forever() => result,
        }
    }

    async fn run_forever(&mut self) -> Result<()> {
        loop {
            match self.run_session().await {
                SessionOutcome::ReconnectNow => {
                    if let Some(metrics) = feed_metrics() {
                        metrics.reconnects.with_label_values(&["liveness"]).inc();
                    }
                    info!("Reconnecting to WebSocket");
                }
                SessionOutcome::ReconnectAfterCooldown => {
                    if let Some(metrics) = feed_metrics() {
                        metrics.reconnects.with_label_values(&["cooldown"]).inc();
                    }
                    self.set_state(ListenerState::ReconnectWait);
                    sleep(self.config.reconnect_cooldown).await;
                }
                SessionOutcome::Terminate => {
                    self.set_state(ListenerState::Disconnected);
                    warn!("Diff output closed, stopping listener");
                    return Err(MarketDataError::ChannelClosed);
                }
            }
        }
    }

    /// One connection session, from pair resolution to socket close
    pub async fn run_session(&mut self) -> SessionOutcome {
        self.set_state(ListenerState::Connecting);

        let pairs = match self.pairs.resolve().await {
            Ok(pairs) => pairs,
            Err(e) => {
                error!(
                    error = %e,
                    cooldown_secs = self.config.reconnect_cooldown.as_secs(),
                    "Failed to resolve trading pairs. Retrying after cooldown"
                );
                return SessionOutcome::ReconnectAfterCooldown;
            }
        };

        let mut connection = match self.connector.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                error!(
                    error = %e,
                    cooldown_secs = self.config.reconnect_cooldown.as_secs(),
                    "Unexpected error with WebSocket connection. Retrying after cooldown"
                );
                return SessionOutcome::ReconnectAfterCooldown;
            }
        };

        let outcome = self.stream_frames(&mut connection, &pairs).await;
        connection.close().await;
        self.set_state(ListenerState::Disconnected);
        outcome
    }

    async fn stream_frames(
        &mut self,
        connection: &mut C::Connection,
        pairs: &[String],
    ) -> SessionOutcome {
        let sent = match SubscribeRequest::full(pairs).to_json() {
            Ok(request) => connection.send_text(request).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            return self.session_error(e);
        }
        self.set_state(ListenerState::Subscribed);
        info!(pairs = pairs.len(), "Subscribed to full channel");

        loop {
            let raw = match next_frame(connection, &self.config).await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    info!("WebSocket closed by peer");
                    return SessionOutcome::ReconnectNow;
                }
                Err(e) => return self.session_error(e),
            };
            self.set_state(ListenerState::Receiving);

            if let FrameOutcome::End(outcome) = self.handle_frame(&raw) {
                return outcome;
            }
        }
    }

    /// Classify one frame and enqueue its diff, if any
    fn handle_frame(&mut self, raw: &str) -> FrameOutcome {
        let diff = match FeedMessage::parse(raw).and_then(FeedMessage::into_diff) {
            Ok(diff) => diff,
            Err(e) => return FrameOutcome::End(self.session_error(e)),
        };

        let Some(diff) = diff else {
            if let Some(metrics) = feed_metrics() {
                metrics.frames_ignored.inc();
            }
            return FrameOutcome::Continue;
        };

        let kind = diff.kind();
        if self.output.send(diff).is_err() {
            return FrameOutcome::End(SessionOutcome::Terminate);
        }
        if let Some(metrics) = feed_metrics() {
            metrics.diffs_enqueued.with_label_values(&[kind]).inc();
        }
        FrameOutcome::Continue
    }

    fn session_error(&self, e: MarketDataError) -> SessionOutcome {
        if e.is_liveness_failure() {
            warn!(error = %e, "WebSocket ping timed out. Going to reconnect...");
            SessionOutcome::ReconnectNow
        } else {
            error!(
                error = %e,
                cooldown_secs = self.config.reconnect_cooldown.as_secs(),
                "Unexpected error with WebSocket connection. Retrying after cooldown"
            );
            SessionOutcome::ReconnectAfterCooldown
        }
    }
}

/// Receive with a deadline, then probe with a deadline
///
/// `Ok(None)` means the peer closed. The probe (sending the ping and
/// waiting for any inbound frame) is bounded by `ping_timeout` as a whole;
/// running out is [`MarketDataError::ConnectionTimeout`].
async fn next_frame<T>(connection: &mut T, config: &ListenerConfig) -> Result<Option<String>>
where
    T: FeedConnection + ?Sized,
{
    loop {
        let inbound = match timeout(config.message_timeout, connection.recv()).await {
            Ok(inbound) => inbound?,
            Err(_) => {
                debug!(
                    timeout_secs = config.message_timeout.as_secs(),
                    "No message within timeout, sending ping"
                );
                let probe = async {
                    connection.ping().await?;
                    connection.recv().await
                };
                match timeout(config.ping_timeout, probe).await {
                    Ok(inbound) => inbound?,
                    Err(_) => return Err(MarketDataError::ConnectionTimeout),
                }
            }
        };

        match inbound {
            Inbound::Text(text) => return Ok(Some(text)),
            Inbound::Control => continue,
            Inbound::Closed => return Ok(None),
        }
    }
}
