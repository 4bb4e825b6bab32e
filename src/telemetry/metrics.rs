//! Prometheus metrics

use crate::feed::Channel;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One storage write call for a flushed batch
    PersistBatch,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Normalized records handed to the pipeline
    RecordsReceived(Channel),
    /// Frames that failed to decode
    DecodeErrors(Channel),
    /// Reconnection attempts
    Reconnects(Channel),
    /// Batches drained from the buffer
    BatchesFlushed,
    /// Points accepted by the storage backend
    PointsWritten,
    /// Failed storage writes (each drops one batch)
    PersistErrors,
    /// Failed cache reads or writes
    CacheErrors,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Records currently held in the ingestion buffer
    BufferOccupancy,
    /// Records processed per second since start
    Throughput,
    /// Resident set size of this process
    ResidentMemoryMb,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::PersistBatch => "ingest_persist_batch_latency_ms",
    };

    ::metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Increment a counter
pub fn increment_counter(metric: CounterMetric, value: u64) {
    match metric {
        CounterMetric::RecordsReceived(channel) => {
            ::metrics::counter!("ingest_records_received_total", "channel" => channel.as_str())
                .increment(value)
        }
        CounterMetric::DecodeErrors(channel) => {
            ::metrics::counter!("ingest_decode_errors_total", "channel" => channel.as_str())
                .increment(value)
        }
        CounterMetric::Reconnects(channel) => {
            ::metrics::counter!("ingest_reconnects_total", "channel" => channel.as_str())
                .increment(value)
        }
        CounterMetric::BatchesFlushed => {
            ::metrics::counter!("ingest_batches_flushed_total").increment(value)
        }
        CounterMetric::PointsWritten => {
            ::metrics::counter!("ingest_points_written_total").increment(value)
        }
        CounterMetric::PersistErrors => {
            ::metrics::counter!("ingest_persist_errors_total").increment(value)
        }
        CounterMetric::CacheErrors => {
            ::metrics::counter!("ingest_cache_errors_total").increment(value)
        }
    }
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::BufferOccupancy => "ingest_buffer_occupancy",
        GaugeMetric::Throughput => "ingest_throughput_per_sec",
        GaugeMetric::ResidentMemoryMb => "ingest_resident_memory_mb",
    };

    ::metrics::gauge!(metric_name).set(value);
}

/// Serve the Prometheus scrape endpoint on the given port
pub fn init_metrics_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;

    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_recorder_are_noops() {
        increment_counter(CounterMetric::RecordsReceived(Channel::Ticker), 1);
        increment_counter(CounterMetric::PersistErrors, 1);
        set_gauge(GaugeMetric::BufferOccupancy, 12.0);
        record_latency(LatencyMetric::PersistBatch, Duration::from_millis(3));
    }
}
