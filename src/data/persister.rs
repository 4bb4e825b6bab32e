//! Batch to time-series conversion and persistence

use super::storage::{Point, StorageBackend, ORDERBOOK_MEASUREMENT, TICKER_MEASUREMENT};
use crate::buffer::{Batch, BufferedRecord};
use crate::error::PersistenceError;
use crate::feed::{MarketRecord, Tick};
use crate::orderbook::OrderBookSnapshot;
use crate::telemetry::{increment_counter, record_latency, CounterMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Tag value used when a record carries no symbol
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Snapshot of the persister's monotonic counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PersisterCounters {
    pub ticker_writes: u64,
    pub orderbook_writes: u64,
    pub errors: u64,
}

impl PersisterCounters {
    pub fn total_writes(&self) -> u64 {
        self.ticker_writes + self.orderbook_writes
    }

    /// Percentage of write outcomes that succeeded
    pub fn success_rate(&self) -> f64 {
        let writes = self.total_writes() as f64;
        writes / (writes + self.errors as f64).max(1.0) * 100.0
    }
}

/// Converts batches into points and writes each batch in one backend call
pub struct BatchPersister {
    backend: Arc<dyn StorageBackend>,
    ticker_writes: AtomicU64,
    orderbook_writes: AtomicU64,
    errors: AtomicU64,
}

impl BatchPersister {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            ticker_writes: AtomicU64::new(0),
            orderbook_writes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Write one batch; returns the number of points written.
    ///
    /// A failed batch is counted and dropped, never retried.
    pub async fn persist(&self, batch: &Batch) -> Result<usize, PersistenceError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let points = batch_to_points(batch);
        let ticks = batch.tick_count() as u64;
        let orderbooks = batch.orderbook_count() as u64;

        let start = Instant::now();
        let result = self.backend.write(&points).await;
        record_latency(LatencyMetric::PersistBatch, start.elapsed());

        match result {
            Ok(()) => {
                self.ticker_writes.fetch_add(ticks, Ordering::Relaxed);
                self.orderbook_writes.fetch_add(orderbooks, Ordering::Relaxed);
                increment_counter(CounterMetric::BatchesFlushed, 1);
                increment_counter(CounterMetric::PointsWritten, points.len() as u64);

                tracing::info!(
                    backend = self.backend.name(),
                    points = points.len(),
                    ticks,
                    orderbooks,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Batch persisted"
                );
                Ok(points.len())
            }
            Err(source) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                increment_counter(CounterMetric::PersistErrors, 1);

                tracing::error!(
                    backend = self.backend.name(),
                    points = points.len(),
                    error = %source,
                    "Batch dropped after failed write"
                );
                Err(PersistenceError::Write {
                    points: points.len(),
                    source,
                })
            }
        }
    }

    pub fn counters(&self) -> PersisterCounters {
        PersisterCounters {
            ticker_writes: self.ticker_writes.load(Ordering::Relaxed),
            orderbook_writes: self.orderbook_writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// One point per buffered record, in batch order
pub fn batch_to_points(batch: &Batch) -> Vec<Point> {
    batch.records().iter().map(record_to_point).collect()
}

fn record_to_point(buffered: &BufferedRecord) -> Point {
    let timestamp_ns = timestamp_ns(buffered.ingestion_time);

    match &buffered.record {
        MarketRecord::Tick(tick) => Point {
            measurement: TICKER_MEASUREMENT,
            symbol: symbol_tag(&tick.symbol),
            fields: tick_fields(tick),
            timestamp_ns,
        },
        MarketRecord::OrderBook(book) => Point {
            measurement: ORDERBOOK_MEASUREMENT,
            symbol: symbol_tag(&book.symbol),
            fields: orderbook_fields(book),
            timestamp_ns,
        },
    }
}

fn tick_fields(tick: &Tick) -> Vec<(&'static str, f64)> {
    vec![
        ("trade_price", to_f64(tick.trade_price)),
        ("change_rate", to_f64(tick.change_rate)),
        ("trade_volume", to_f64(tick.trade_volume)),
        ("volume_24h", to_f64(tick.cumulative_volume_24h)),
        ("volume_24h_krw", to_f64(tick.cumulative_value_24h)),
        ("high_price", to_f64(tick.high)),
        ("low_price", to_f64(tick.low)),
        ("prev_close", to_f64(tick.prev_close)),
    ]
}

fn orderbook_fields(book: &OrderBookSnapshot) -> Vec<(&'static str, f64)> {
    vec![
        ("best_ask", to_f64(book.best_ask)),
        ("best_bid", to_f64(book.best_bid)),
        ("spread_abs", to_f64(book.spread_abs)),
        ("spread_pct", to_f64(book.spread_pct)),
        ("total_ask_size", to_f64(book.total_ask_size)),
        ("total_bid_size", to_f64(book.total_bid_size)),
        ("market_pressure", book.market_pressure()),
        ("liquidity_score", book.liquidity_score()),
    ]
}

fn symbol_tag(symbol: &str) -> String {
    if symbol.is_empty() {
        UNKNOWN_SYMBOL.to_string()
    } else {
        symbol.to_string()
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Nanoseconds since the epoch; falls back to the current time outside the
/// representable range
fn timestamp_ns(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt()
        .or_else(|| Utc::now().timestamp_nanos_opt())
        .unwrap_or_default()
}
