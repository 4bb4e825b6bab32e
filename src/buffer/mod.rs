//! Bounded ingestion buffer
//!
//! Both channel loops append here. One lock covers stamping, appending,
//! the flush predicate and the drain, so exactly one `add` call observes a
//! trigger and takes the whole batch.

use crate::clock::Clock;
use crate::config::BufferConfig;
use crate::feed::MarketRecord;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// A record together with the time it entered the buffer
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedRecord {
    pub record: MarketRecord,
    pub ingestion_time: DateTime<Utc>,
}

/// Records drained from the buffer in arrival order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    records: Vec<BufferedRecord>,
}

impl Batch {
    pub fn new(records: Vec<BufferedRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[BufferedRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<BufferedRecord> {
        self.records
    }

    pub fn tick_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.record, MarketRecord::Tick(_)))
            .count()
    }

    pub fn orderbook_count(&self) -> usize {
        self.len() - self.tick_count()
    }
}

/// Which condition caused a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Occupancy reached the flush threshold
    Size,
    /// Flush interval elapsed since the previous flush
    Interval,
    /// Occupancy passed the high-watermark fraction of capacity
    HighWatermark,
    /// Occupancy reached capacity
    Capacity,
}

/// Point-in-time buffer statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferStats {
    pub len: usize,
    pub capacity: usize,
    pub ticks_added: u64,
    pub orderbooks_added: u64,
    pub total_flushed: u64,
    pub flush_count: u64,
    pub last_flush: Option<DateTime<Utc>>,
}

impl BufferStats {
    /// Occupancy as a percentage of capacity
    pub fn usage_pct(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.len as f64 / self.capacity as f64 * 100.0
    }
}

struct BufferState {
    records: Vec<BufferedRecord>,
    last_flush: DateTime<Utc>,
    ticks_added: u64,
    orderbooks_added: u64,
    total_flushed: u64,
    flush_count: u64,
    flushed_once: bool,
}

/// Concurrency-safe accumulator with size, interval and memory triggers
pub struct IngestionBuffer {
    config: BufferConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BufferState>,
}

impl IngestionBuffer {
    pub fn new(config: BufferConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            state: Mutex::new(BufferState {
                records: Vec::with_capacity(config.capacity),
                last_flush: now,
                ticks_added: 0,
                orderbooks_added: 0,
                total_flushed: 0,
                flush_count: 0,
                flushed_once: false,
            }),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Stamp and append a record; returns the whole buffer as a batch when a
    /// flush trigger fires.
    pub fn add(&self, record: MarketRecord) -> Option<Batch> {
        let mut state = self.state.lock();
        let now = self.clock.now();

        match record {
            MarketRecord::Tick(_) => state.ticks_added += 1,
            MarketRecord::OrderBook(_) => state.orderbooks_added += 1,
        }
        state.records.push(BufferedRecord {
            record,
            ingestion_time: now,
        });

        let trigger = self.flush_trigger(&state, now)?;
        let batch = Self::drain(&mut state, now);

        tracing::debug!(
            ?trigger,
            count = batch.len(),
            ticks = batch.tick_count(),
            orderbooks = batch.orderbook_count(),
            "Buffer flush"
        );

        Some(batch)
    }

    /// Drain everything regardless of triggers
    pub fn flush(&self) -> Batch {
        let mut state = self.state.lock();
        let now = self.clock.now();
        Self::drain(&mut state, now)
    }

    fn flush_trigger(&self, state: &BufferState, now: DateTime<Utc>) -> Option<FlushTrigger> {
        let len = state.records.len();

        if len >= self.config.capacity {
            Some(FlushTrigger::Capacity)
        } else if len >= self.config.flush_threshold {
            Some(FlushTrigger::Size)
        } else if now - state.last_flush >= self.config.flush_interval() {
            Some(FlushTrigger::Interval)
        } else if len as f64 > self.config.high_watermark * self.config.capacity as f64 {
            Some(FlushTrigger::HighWatermark)
        } else {
            None
        }
    }

    fn drain(state: &mut BufferState, now: DateTime<Utc>) -> Batch {
        let records = std::mem::take(&mut state.records);
        state.last_flush = now;
        state.flushed_once = true;

        if !records.is_empty() {
            state.total_flushed += records.len() as u64;
            state.flush_count += 1;
        }

        Batch::new(records)
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> BufferStats {
        let state = self.state.lock();
        BufferStats {
            len: state.records.len(),
            capacity: self.config.capacity,
            ticks_added: state.ticks_added,
            orderbooks_added: state.orderbooks_added,
            total_flushed: state.total_flushed,
            flush_count: state.flush_count,
            last_flush: state.flushed_once.then_some(state.last_flush),
        }
    }
}
