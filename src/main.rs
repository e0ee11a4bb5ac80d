//! Coinbase Pro Market Data Handler
//!
//! Builds initial order books from REST snapshots, then keeps them current
//! from the full-channel diff stream and hourly snapshot refreshes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::get, Json, Router};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cbpro_market_data::{
    AppState, Config, DiffListener, DiffMessage, ExchangeClient, ListenerState, MarketDirectory,
    OrderBookManager, SnapshotMessage, SnapshotRefresher, TrackingEntryBuilder, TradingPairs,
    WebSocketConnector,
};

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Coinbase Pro Market Data Handler");

    let config = Arc::new(Config::load()?);
    info!(trading_pairs = ?config.trading_pairs, "Configuration loaded");

    let client = ExchangeClient::new(&config.rest())?;
    let directory = Arc::new(MarketDirectory::new(
        client.clone(),
        config.market_cache_ttl(),
    ));
    let pairs = TradingPairs::from_config(config.trading_pairs.clone(), directory);

    let entries = TrackingEntryBuilder::new(client.clone(), pairs.clone(), config.snapshot_pacing())
        .tracking_entries()
        .await?;
    info!(books = entries.len(), "Initial order books built");

    let shutdown = CancellationToken::new();
    let (diff_tx, diff_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();

    let mut listener = DiffListener::new(
        WebSocketConnector::new(&config.ws_endpoint),
        pairs.clone(),
        diff_tx,
        config.listener(),
    );

    let state = Arc::new(AppState {
        orderbook_manager: Arc::new(RwLock::new(OrderBookManager::with_entries(entries))),
        config: config.clone(),
        listener_state: listener.watch_state(),
    });

    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state).await {
            warn!(error = %e, "Health server error");
        }
    });

    let listener_token = shutdown.clone();
    let listener_task = tokio::spawn(async move {
        if let Err(e) = listener.run(listener_token).await {
            error!(error = %e, "Diff listener stopped");
        }
    });

    let refresher = SnapshotRefresher::new(client, pairs, snapshot_tx, config.refresher());
    let refresher_token = shutdown.clone();
    let refresher_task = tokio::spawn(async move {
        if let Err(e) = refresher.run(refresher_token).await {
            error!(error = %e, "Snapshot refresher stopped");
        }
    });

    tokio::select! {
        _ = consume(state, diff_rx, snapshot_rx) => {
            warn!("Both feeds closed");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
    }

    shutdown.cancel();
    let _ = tokio::join!(listener_task, refresher_task);
    info!("Market data handler stopped");

    Ok(())
}

/// Drain both feeds into the order book manager
async fn consume(
    state: Arc<AppState>,
    mut diffs: mpsc::UnboundedReceiver<DiffMessage>,
    mut snapshots: mpsc::UnboundedReceiver<SnapshotMessage>,
) {
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    let mut diffs_open = true;
    let mut snapshots_open = true;

    while diffs_open || snapshots_open {
        tokio::select! {
            diff = diffs.recv(), if diffs_open => match diff {
                Some(diff) => {
                    state.orderbook_manager.write().await.apply_diff(&diff);
                }
                None => diffs_open = false,
            },
            snapshot = snapshots.recv(), if snapshots_open => match snapshot {
                Some(snapshot) => {
                    let replaced = state.orderbook_manager.write().await.apply_snapshot(&snapshot);
                    info!(
                        product_id = %snapshot.product_id,
                        sequence = snapshot.sequence,
                        replaced,
                        "Snapshot received"
                    );
                }
                None => snapshots_open = false,
            },
            _ = status.tick() => log_status(&state).await,
        }
    }
}

async fn log_status(state: &AppState) {
    let manager = state.orderbook_manager.read().await;
    for product_id in manager.product_ids() {
        if let Some(book) = manager.get_state(&product_id, state.config.depth_levels) {
            info!(
                product_id = %product_id,
                sequence = book.last_update_id,
                mid = ?book.metrics.mid_price,
                spread_bps = ?book.metrics.spread_bps,
                imbalance = ?book.metrics.imbalance,
                healthy = book.metrics.is_healthy(),
                "Order book status"
            );
        }
    }
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.health_port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let books = state.orderbook_manager.read().await.len();
    let listener = *state.listener_state.borrow();
    let status = match listener {
        ListenerState::ReconnectWait => "degraded",
        _ => "healthy",
    };
    Json(serde_json::json!({
        "status": status,
        "component": "cbpro-market-data",
        "books": books,
        "listener": format!("{:?}", listener),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics() -> String {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
