//! Parser module for Coinbase Pro REST and WebSocket payloads
//!
//! Handles deserialization of products, tickers, level 3 snapshots and
//! full-channel feed frames, and classifies feed frames by their `type`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::{MarketDataError, Result};
use crate::messages::{DiffEvent, DiffMessage};

/// Product from `GET /products`
#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub id: String,
    pub base_currency: String,
    pub quote_currency: String,
}

/// Ticker from `GET /products/{id}/ticker`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ticker {
    #[serde(default)]
    pub price: Option<Decimal>,

    /// 24h volume
    #[serde(default)]
    pub volume: Option<Decimal>,
}

/// Side of a resting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// One resting order in a level 3 snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub price: Decimal,
    pub size: Decimal,
    pub order_id: String,
}

/// Level 3 order book from `GET /products/{id}/book?level=3`
#[derive(Debug, Clone, Deserialize)]
pub struct RawSnapshot {
    pub sequence: u64,

    #[serde(deserialize_with = "deserialize_snapshot_rows")]
    pub bids: Vec<SnapshotRow>,

    #[serde(deserialize_with = "deserialize_snapshot_rows")]
    pub asks: Vec<SnapshotRow>,
}

/// Subscription request sent right after connecting
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub product_ids: &'a [String],
    pub channels: [&'static str; 1],
}

impl<'a> SubscribeRequest<'a> {
    /// Subscribe to the full channel for the given products
    pub fn full(product_ids: &'a [String]) -> Self {
        Self {
            kind: "subscribe",
            product_ids,
            channels: ["full"],
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenFrame {
    pub product_id: String,
    pub sequence: u64,
    pub time: DateTime<Utc>,
    pub side: OrderSide,
    pub order_id: String,
    pub price: Decimal,
    pub remaining_size: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchFrame {
    pub product_id: String,
    pub sequence: u64,
    pub time: DateTime<Utc>,
    /// Side of the maker order
    pub side: OrderSide,
    pub trade_id: u64,
    pub maker_order_id: String,
    pub taker_order_id: String,
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeFrame {
    pub product_id: String,
    pub sequence: u64,
    pub time: DateTime<Utc>,
    pub side: OrderSide,
    pub order_id: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub old_size: Option<Decimal>,
    #[serde(default)]
    pub new_size: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoneFrame {
    pub product_id: String,
    pub sequence: u64,
    pub time: DateTime<Utc>,
    pub side: OrderSide,
    pub order_id: String,
    /// Absent for market orders, which never rest on the book
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub remaining_size: Option<Decimal>,
    #[serde(default)]
    pub reason: String,
}

/// Classified full-channel frame
#[derive(Debug, Clone)]
pub enum FeedMessage {
    Open(OpenFrame),
    Match(MatchFrame),
    Change(ChangeFrame),
    Done(DoneFrame),
    Received,
    Activate,
    Subscriptions,
    Error { message: String },
}

impl FeedMessage {
    /// Parse a raw WebSocket frame
    ///
    /// A frame with no `type`, or a `type` outside the full channel
    /// vocabulary, is a [`MarketDataError::Protocol`] error.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;

        let kind = match value.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => {
                return Err(MarketDataError::Protocol(format!(
                    "message does not contain a type - {}",
                    raw
                )))
            }
        };

        match kind.as_str() {
            "open" => Ok(FeedMessage::Open(serde_json::from_value(value)?)),
            "match" => Ok(FeedMessage::Match(serde_json::from_value(value)?)),
            "change" => Ok(FeedMessage::Change(serde_json::from_value(value)?)),
            "done" => Ok(FeedMessage::Done(serde_json::from_value(value)?)),
            "received" => Ok(FeedMessage::Received),
            "activate" => Ok(FeedMessage::Activate),
            "subscriptions" => Ok(FeedMessage::Subscriptions),
            "error" => Ok(FeedMessage::Error {
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            other => Err(MarketDataError::Protocol(format!(
                "unrecognized message type '{}' - {}",
                other, raw
            ))),
        }
    }

    /// Convert into a diff message
    ///
    /// Returns `Ok(None)` for frames that do not touch the book: `received`,
    /// `activate`, `subscriptions`, and price-less `done` frames (filled
    /// market orders). An `error` frame becomes [`MarketDataError::ExchangeError`].
    pub fn into_diff(self) -> Result<Option<DiffMessage>> {
        let diff = match self {
            FeedMessage::Open(frame) => DiffMessage {
                product_id: frame.product_id,
                sequence: frame.sequence,
                time: frame.time,
                side: frame.side,
                event: DiffEvent::Open {
                    order_id: frame.order_id,
                    price: frame.price,
                    remaining_size: frame.remaining_size,
                },
            },
            FeedMessage::Match(frame) => DiffMessage {
                product_id: frame.product_id,
                sequence: frame.sequence,
                time: frame.time,
                side: frame.side,
                event: DiffEvent::Match {
                    trade_id: frame.trade_id,
                    maker_order_id: frame.maker_order_id,
                    taker_order_id: frame.taker_order_id,
                    price: frame.price,
                    size: frame.size,
                },
            },
            FeedMessage::Change(frame) => DiffMessage {
                product_id: frame.product_id,
                sequence: frame.sequence,
                time: frame.time,
                side: frame.side,
                event: DiffEvent::Change {
                    order_id: frame.order_id,
                    price: frame.price,
                    old_size: frame.old_size,
                    new_size: frame.new_size,
                },
            },
            FeedMessage::Done(frame) => {
                let Some(price) = frame.price else {
                    return Ok(None);
                };
                DiffMessage {
                    product_id: frame.product_id,
                    sequence: frame.sequence,
                    time: frame.time,
                    side: frame.side,
                    event: DiffEvent::Done {
                        order_id: frame.order_id,
                        price,
                        remaining_size: frame.remaining_size,
                        reason: frame.reason,
                    },
                }
            }
            FeedMessage::Received | FeedMessage::Activate | FeedMessage::Subscriptions => {
                return Ok(None)
            }
            FeedMessage::Error { message } => return Err(MarketDataError::ExchangeError(message)),
        };

        Ok(Some(diff))
    }
}

/// Custom deserializer for level 3 rows: `[price, size, order_id]` string triples
fn deserialize_snapshot_rows<'de, D>(deserializer: D) -> std::result::Result<Vec<SnapshotRow>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|row| {
            if row.len() != 3 {
                return Err(serde::de::Error::custom("Invalid level 3 row format"));
            }
            let mut row = row.into_iter();
            let price = row.next().unwrap_or_default();
            let size = row.next().unwrap_or_default();
            let order_id = row.next().unwrap_or_default();
            Ok(SnapshotRow {
                price: Decimal::from_str(&price).map_err(serde::de::Error::custom)?,
                size: Decimal::from_str(&size).map_err(serde::de::Error::custom)?,
                order_id,
            })
        })
        .collect()
}
