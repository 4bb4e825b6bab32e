//! Per-record ingestion path shared by both channel loops

use super::probe::ResourceProbe;
use super::stats::CollectionStats;
use crate::buffer::IngestionBuffer;
use crate::cache::LatestValueCache;
use crate::data::BatchPersister;
use crate::error::PersistenceError;
use crate::feed::{MarketRecord, RecordSink};
use crate::telemetry::{set_gauge, GaugeMetric};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Buffer, cache and persister wired together
pub struct Pipeline {
    buffer: IngestionBuffer,
    persister: BatchPersister,
    cache: Option<LatestValueCache>,
    probe: Arc<dyn ResourceProbe>,
    report_every: u64,
    ticks_processed: AtomicU64,
    orderbooks_processed: AtomicU64,
    /// Sum of both kinds; drives the report cadence
    processed: AtomicU64,
    started: Instant,
}

impl Pipeline {
    pub fn new(
        buffer: IngestionBuffer,
        persister: BatchPersister,
        cache: Option<LatestValueCache>,
        probe: Arc<dyn ResourceProbe>,
    ) -> Self {
        Self {
            buffer,
            persister,
            cache,
            probe,
            report_every: 50,
            ticks_processed: AtomicU64::new(0),
            orderbooks_processed: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Emit statistics every `n` processed records (0 disables)
    pub fn report_every(mut self, n: u64) -> Self {
        self.report_every = n;
        self
    }

    pub fn buffer(&self) -> &IngestionBuffer {
        &self.buffer
    }

    pub fn persister(&self) -> &BatchPersister {
        &self.persister
    }

    pub fn cache(&self) -> Option<&LatestValueCache> {
        self.cache.as_ref()
    }

    /// Buffer one record, cache it if it is a tick, and persist any batch
    /// the buffer hands back before returning.
    pub async fn ingest(&self, record: MarketRecord) {
        let cached_tick = match (&record, &self.cache) {
            (MarketRecord::Tick(tick), Some(_)) => Some(tick.clone()),
            _ => None,
        };
        let is_tick = matches!(record, MarketRecord::Tick(_));

        let batch = self.buffer.add(record);

        if let (Some(cache), Some(tick)) = (&self.cache, cached_tick) {
            cache.put_tick(&tick).await;
        }

        if let Some(batch) = batch {
            // Failures are counted and logged by the persister; the batch is gone either way
            let _ = self.persister.persist(&batch).await;
        }

        let counter = if is_tick {
            &self.ticks_processed
        } else {
            &self.orderbooks_processed
        };
        counter.fetch_add(1, Ordering::Relaxed);

        set_gauge(GaugeMetric::BufferOccupancy, self.buffer.len() as f64);

        // Each count is observed by exactly one caller
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if self.report_every > 0 && processed % self.report_every == 0 {
            self.stats().report();
        }
    }

    /// Force out whatever is buffered and persist it
    pub async fn drain(&self) -> Result<usize, PersistenceError> {
        let batch = self.buffer.flush();
        if batch.is_empty() {
            return Ok(0);
        }

        tracing::info!(count = batch.len(), "Final flush");
        self.persister.persist(&batch).await
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            uptime: self.started.elapsed(),
            ticks_processed: self.ticks_processed.load(Ordering::Relaxed),
            orderbooks_processed: self.orderbooks_processed.load(Ordering::Relaxed),
            buffer: self.buffer.stats(),
            persister: self.persister.counters(),
            resources: self.probe.sample(),
            cache_enabled: self.cache.is_some(),
        }
    }
}

#[async_trait]
impl RecordSink for Pipeline {
    async fn process(&self, record: MarketRecord) {
        self.ingest(record).await;
    }
}
