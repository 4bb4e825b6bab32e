//! Canonical market records and subscription types

use crate::orderbook::OrderBookSnapshot;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A streaming channel on the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Ticker,
    Orderbook,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Ticker, Channel::Orderbook];

    /// Wire name, also used as a metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Ticker => "ticker",
            Channel::Orderbook => "orderbook",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single trade/price update for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Market code (e.g., "KRW-BTC")
    pub symbol: String,
    /// Direction versus previous close: RISE, FALL or EVEN
    pub change: String,
    pub trade_price: Decimal,
    pub change_rate: Decimal,
    pub trade_volume: Decimal,
    pub cumulative_volume_24h: Decimal,
    /// 24h traded value in quote currency
    pub cumulative_value_24h: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub prev_close: Decimal,
    /// Local time the frame was normalized
    pub received_at: DateTime<Utc>,
}

/// Normalized record from either channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MarketRecord {
    Tick(Tick),
    OrderBook(OrderBookSnapshot),
}

impl MarketRecord {
    pub fn symbol(&self) -> &str {
        match self {
            MarketRecord::Tick(tick) => &tick.symbol,
            MarketRecord::OrderBook(book) => &book.symbol,
        }
    }

    /// Channel this record arrived on
    pub fn channel(&self) -> Channel {
        match self {
            MarketRecord::Tick(_) => Channel::Ticker,
            MarketRecord::OrderBook(_) => Channel::Orderbook,
        }
    }
}

impl From<Tick> for MarketRecord {
    fn from(tick: Tick) -> Self {
        MarketRecord::Tick(tick)
    }
}

impl From<OrderBookSnapshot> for MarketRecord {
    fn from(book: OrderBookSnapshot) -> Self {
        MarketRecord::OrderBook(book)
    }
}

#[derive(Serialize)]
struct TicketField<'a> {
    ticket: &'a str,
}

#[derive(Serialize)]
struct TypeField<'a> {
    #[serde(rename = "type")]
    channel: Channel,
    codes: &'a [String],
}

/// One-shot subscription request: `[{"ticket": ..}, {"type": .., "codes": [..]}]`
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub ticket: String,
    pub channel: Channel,
    pub codes: Vec<String>,
}

impl SubscriptionRequest {
    /// Build a request with a fresh unique ticket
    pub fn new(channel: Channel, codes: &[String]) -> Self {
        Self {
            ticket: uuid::Uuid::new_v4().to_string(),
            channel,
            codes: codes.to_vec(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&(
            TicketField {
                ticket: &self.ticket,
            },
            TypeField {
                channel: self.channel,
                codes: &self.codes,
            },
        ))
    }
}
