//! Upbit frame decoding and normalization
//!
//! Pure functions: raw channel payloads in, canonical records out.

use super::types::{Channel, MarketRecord, Tick};
use crate::error::DecodeError;
use crate::orderbook::{OrderBookSnapshot, PriceLevel};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Upbit public WebSocket endpoint
pub const UPBIT_WS_URL: &str = "wss://api.upbit.com/websocket/v1";

/// Upbit ticker frame. Missing numbers decode as zero, missing strings as empty.
#[derive(Debug, Deserialize)]
struct UpbitTicker {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    change: String,
    #[serde(default)]
    trade_price: Decimal,
    #[serde(default)]
    change_rate: Decimal,
    #[serde(default)]
    trade_volume: Decimal,
    #[serde(default)]
    acc_trade_volume_24h: Decimal,
    #[serde(default)]
    acc_trade_price_24h: Decimal,
    #[serde(default)]
    high_price: Decimal,
    #[serde(default)]
    low_price: Decimal,
    #[serde(default)]
    prev_closing_price: Decimal,
}

/// Upbit order book frame
#[derive(Debug, Deserialize)]
struct UpbitOrderbook {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    orderbook_units: Vec<UpbitOrderbookUnit>,
}

/// One paired ask/bid level
#[derive(Debug, Deserialize)]
struct UpbitOrderbookUnit {
    #[serde(default)]
    ask_price: Decimal,
    #[serde(default)]
    ask_size: Decimal,
    #[serde(default)]
    bid_price: Decimal,
    #[serde(default)]
    bid_size: Decimal,
}

/// Decode one raw frame received on `channel`.
///
/// Returns `Ok(None)` for well-formed frames that are not data for this
/// channel (status messages, frames of another type).
pub fn decode_frame(
    channel: Channel,
    payload: &[u8],
    received_at: DateTime<Utc>,
) -> Result<Option<MarketRecord>, DecodeError> {
    match channel {
        Channel::Ticker => {
            let raw: UpbitTicker = serde_json::from_slice(payload)?;
            if raw.kind != Channel::Ticker.as_str() {
                return Ok(None);
            }
            Ok(Some(MarketRecord::Tick(normalize_ticker(raw, received_at))))
        }
        Channel::Orderbook => {
            let raw: UpbitOrderbook = serde_json::from_slice(payload)?;
            if raw.kind != Channel::Orderbook.as_str() {
                return Ok(None);
            }
            Ok(Some(MarketRecord::OrderBook(normalize_orderbook(
                raw,
                received_at,
            ))))
        }
    }
}

fn normalize_ticker(raw: UpbitTicker, received_at: DateTime<Utc>) -> Tick {
    Tick {
        symbol: raw.code,
        change: raw.change,
        trade_price: raw.trade_price,
        change_rate: raw.change_rate,
        trade_volume: raw.trade_volume,
        cumulative_volume_24h: raw.acc_trade_volume_24h,
        cumulative_value_24h: raw.acc_trade_price_24h,
        high: raw.high_price,
        low: raw.low_price,
        prev_close: raw.prev_closing_price,
        received_at,
    }
}

fn normalize_orderbook(raw: UpbitOrderbook, received_at: DateTime<Utc>) -> OrderBookSnapshot {
    let (asks, bids): (Vec<PriceLevel>, Vec<PriceLevel>) = raw
        .orderbook_units
        .iter()
        .map(|unit| {
            (
                PriceLevel::new(unit.ask_price, unit.ask_size),
                PriceLevel::new(unit.bid_price, unit.bid_size),
            )
        })
        .unzip();

    OrderBookSnapshot::from_levels(raw.code, asks, bids, received_at)
}
