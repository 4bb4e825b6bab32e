//! Storage backend abstraction

use crate::error::StorageError;
use async_trait::async_trait;

/// Measurement for tick points
pub const TICKER_MEASUREMENT: &str = "ticker_data";
/// Measurement for order book summary points
pub const ORDERBOOK_MEASUREMENT: &str = "orderbook_summary";

/// One time-series point: measurement, `symbol` tag, float fields and a
/// nanosecond timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: &'static str,
    pub symbol: String,
    pub fields: Vec<(&'static str, f64)>,
    pub timestamp_ns: i64,
}

impl Point {
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }
}

/// Time-series sink for persisted batches
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Verify the backend is reachable and writable
    async fn health(&self) -> Result<(), StorageError>;

    /// Write all points in one call
    async fn write(&self, points: &[Point]) -> Result<(), StorageError>;

    /// Release resources; no writes follow
    async fn close(&self) -> Result<(), StorageError>;
}
