//! Diff listener against a local WebSocket feed

use cbpro_market_data::config::ListenerConfig;
use cbpro_market_data::exchange::TradingPairs;
use cbpro_market_data::messages::DiffEvent;
use cbpro_market_data::parser::OrderSide;
use cbpro_market_data::websocket::{
    DiffListener, FeedConnection, Inbound, WebSocketClient, WebSocketConnector,
};
use cbpro_market_data::MarketDataError;
use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

const MATCH_FRAME: &str = r#"{"type":"match","trade_id":10,"sequence":50,"maker_order_id":"m-1","taker_order_id":"t-1","time":"2024-03-01T10:00:00.000000Z","product_id":"BTC-USD","size":"0.25","price":"100.5","side":"sell"}"#;

fn listener_config() -> ListenerConfig {
    ListenerConfig {
        message_timeout: Duration::from_secs(30),
        ping_timeout: Duration::from_secs(10),
        reconnect_cooldown: Duration::from_secs(30),
    }
}

/// Serve one session that sends a match and closes, then report the
/// subscribe frame and the next connection attempt.
async fn serve_one_session() -> (String, oneshot::Receiver<Value>, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (subscribe_tx, subscribe_rx) = oneshot::channel();
    let (reconnect_tx, reconnect_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let subscribe = match ws.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected subscribe frame, got {:?}", other),
        };
        let _ = subscribe_tx.send(subscribe);

        ws.send(Message::Text(r#"{"type":"subscriptions","channels":[]}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text(MATCH_FRAME.into())).await.unwrap();
        ws.close(None).await.unwrap();

        let _ = listener.accept().await.unwrap();
        let _ = reconnect_tx.send(());
    });

    (format!("ws://{}", addr), subscribe_rx, reconnect_rx)
}

#[tokio::test]
async fn test_listener_streams_diffs_and_reconnects_after_close() {
    let (endpoint, subscribe_rx, reconnect_rx) = serve_one_session().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();

    let mut listener = DiffListener::new(
        WebSocketConnector::new(&endpoint),
        TradingPairs::fixed(["BTC-USD", "ETH-USD"]),
        tx,
        listener_config(),
    );
    let token = shutdown.clone();
    let task = tokio::spawn(async move { listener.run(token).await });

    let subscribe = timeout(Duration::from_secs(5), subscribe_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscribe["type"], "subscribe");
    assert_eq!(subscribe["channels"], serde_json::json!(["full"]));
    assert_eq!(subscribe["product_ids"], serde_json::json!(["BTC-USD", "ETH-USD"]));

    let diff = timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(diff.product_id, "BTC-USD");
    assert_eq!(diff.sequence, 50);
    assert_eq!(diff.side, OrderSide::Sell);
    match diff.event {
        DiffEvent::Match { price, size, .. } => {
            assert_eq!(price, dec!(100.5));
            assert_eq!(size, dec!(0.25));
        }
        other => panic!("expected match, got {:?}", other),
    }

    // A closed session reconnects without the cooldown
    timeout(Duration::from_secs(5), reconnect_rx)
        .await
        .unwrap()
        .unwrap();
    assert!(rx.try_recv().is_err());

    shutdown.cancel();
    let result = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_binary_frames_must_be_utf8() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Binary(br#"{"type":"activate"}"#.to_vec()))
            .await
            .unwrap();
        ws.send(Message::Binary(vec![0xff, 0xfe, 0x7b])).await.unwrap();
        // Keep the socket open until the client is done
        let _ = ws.next().await;
    });

    let mut client = WebSocketClient::connect(&format!("ws://{}", addr))
        .await
        .unwrap();

    let first = timeout(Duration::from_secs(5), client.recv())
        .await
        .unwrap();
    assert_eq!(first, Ok(Inbound::Text(r#"{"type":"activate"}"#.to_string())));

    let second = timeout(Duration::from_secs(5), client.recv())
        .await
        .unwrap();
    assert!(matches!(second, Err(MarketDataError::ParseError(_))));

    client.close().await;
}
