//! Persistence module
//!
//! Converts flushed batches into time-series points and writes them to a
//! storage backend.

mod influx;
mod parquet;
mod persister;
mod storage;

pub use influx::{to_line_protocol, InfluxBackend};
pub use self::parquet::{measurement_schema, ParquetBackend};
pub use persister::{batch_to_points, BatchPersister, PersisterCounters, UNKNOWN_SYMBOL};
pub use storage::{Point, StorageBackend, ORDERBOOK_MEASUREMENT, TICKER_MEASUREMENT};

#[cfg(test)]
pub(crate) use storage::testing;

use crate::config::StorageConfig;
use crate::error::StorageError;
use std::sync::Arc;

/// Build the backend selected in the configuration
pub fn build_backend(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    Ok(match config {
        StorageConfig::Influx(influx) => Arc::new(InfluxBackend::new(influx.clone())?),
        StorageConfig::Parquet(parquet) => {
            Arc::new(ParquetBackend::new(parquet.output_dir.clone()))
        }
    })
}
