//! Order book snapshot with derived spread and depth fields

use super::PriceLevel;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Spread percentage at which the spread component of the liquidity score reaches zero
const LIQUIDITY_SPREAD_PCT_SCALE: f64 = 0.01;
/// Combined depth at which the volume component of the liquidity score saturates
const LIQUIDITY_VOLUME_SCALE: f64 = 10.0;

/// Point-in-time summary of one symbol's order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    /// Market code (e.g., "KRW-BTC")
    pub symbol: String,
    /// Ask levels, sorted best (lowest) to worst
    pub asks: Vec<PriceLevel>,
    /// Bid levels, sorted best (highest) to worst
    pub bids: Vec<PriceLevel>,
    /// Lowest ask price, zero when there are no asks
    pub best_ask: Decimal,
    /// Highest bid price, zero when there are no bids
    pub best_bid: Decimal,
    /// best_ask - best_bid, zero unless both sides are quoted
    pub spread_abs: Decimal,
    /// Spread as a percentage of best_ask
    pub spread_pct: Decimal,
    pub total_ask_size: Decimal,
    pub total_bid_size: Decimal,
    /// Local time the frame was normalized
    pub received_at: DateTime<Utc>,
}

impl OrderBookSnapshot {
    /// Build a snapshot from unsorted levels, computing every derived field
    pub fn from_levels(
        symbol: impl Into<String>,
        mut asks: Vec<PriceLevel>,
        mut bids: Vec<PriceLevel>,
        received_at: DateTime<Utc>,
    ) -> Self {
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        bids.sort_by(|a, b| b.price.cmp(&a.price));

        let best_ask = asks.first().map(|l| l.price).unwrap_or(Decimal::ZERO);
        let best_bid = bids.first().map(|l| l.price).unwrap_or(Decimal::ZERO);

        let spread_abs = if !best_ask.is_zero() && !best_bid.is_zero() {
            best_ask - best_bid
        } else {
            Decimal::ZERO
        };

        let spread_pct = if best_ask > Decimal::ZERO {
            spread_abs / best_ask * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };

        let total_ask_size = asks.iter().map(|l| l.size).sum();
        let total_bid_size = bids.iter().map(|l| l.size).sum();

        Self {
            symbol: symbol.into(),
            asks,
            bids,
            best_ask,
            best_bid,
            spread_abs,
            spread_pct,
            total_ask_size,
            total_bid_size,
            received_at,
        }
    }

    /// Bid/ask imbalance in [-1, 1]; positive means more resting bid size
    pub fn market_pressure(&self) -> f64 {
        let bid = self.total_bid_size.to_f64().unwrap_or(0.0);
        let ask = self.total_ask_size.to_f64().unwrap_or(0.0);
        let total = bid + ask;

        if total == 0.0 {
            return 0.0;
        }

        ((bid - ask) / total).clamp(-1.0, 1.0)
    }

    /// Average of a tight-spread score and a depth score, each in [0, 1]
    pub fn liquidity_score(&self) -> f64 {
        let spread_pct = self.spread_pct.to_f64().unwrap_or(0.0);
        let depth = (self.total_ask_size + self.total_bid_size)
            .to_f64()
            .unwrap_or(0.0);

        let spread_score = (1.0 - spread_pct / LIQUIDITY_SPREAD_PCT_SCALE).max(0.0);
        let volume_score = (depth / LIQUIDITY_VOLUME_SCALE).min(1.0);

        (spread_score + volume_score) / 2.0
    }
}
