//! Collection statistics snapshot

use super::probe::ResourceUsage;
use crate::buffer::BufferStats;
use crate::data::PersisterCounters;
use crate::telemetry::{set_gauge, GaugeMetric};
use std::time::Duration;

/// Point-in-time view of the whole pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionStats {
    pub uptime: Duration,
    pub ticks_processed: u64,
    pub orderbooks_processed: u64,
    pub buffer: BufferStats,
    pub persister: PersisterCounters,
    pub resources: Option<ResourceUsage>,
    pub cache_enabled: bool,
}

impl CollectionStats {
    pub fn total_processed(&self) -> u64 {
        self.ticks_processed + self.orderbooks_processed
    }

    /// Records processed per second of uptime
    pub fn throughput(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total_processed() as f64 / secs
    }

    /// Emit as a structured log event and update gauges
    pub fn report(&self) {
        set_gauge(GaugeMetric::Throughput, self.throughput());
        set_gauge(GaugeMetric::BufferOccupancy, self.buffer.len as f64);
        if let Some(resources) = self.resources {
            set_gauge(GaugeMetric::ResidentMemoryMb, resources.rss_mb);
        }

        tracing::info!(
            uptime_secs = self.uptime.as_secs(),
            throughput = %format!("{:.1}", self.throughput()),
            ticks = self.ticks_processed,
            orderbooks = self.orderbooks_processed,
            buffer_len = self.buffer.len,
            buffer_usage_pct = %format!("{:.1}", self.buffer.usage_pct()),
            flushes = self.buffer.flush_count,
            writes = self.persister.total_writes(),
            write_errors = self.persister.errors,
            success_rate = %format!("{:.1}", self.persister.success_rate()),
            rss_mb = self.resources.map(|r| r.rss_mb),
            system_memory_pct = self.resources.and_then(|r| r.system_memory_pct),
            cache = self.cache_enabled,
            "Collection stats"
        );
    }
}
