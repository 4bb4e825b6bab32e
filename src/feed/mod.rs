//! Market data feed module
//!
//! Streams Upbit ticker and order book channels and normalizes every frame
//! into a [`MarketRecord`].

mod connector;
mod types;
pub mod upbit;

pub use connector::{ConnectorState, StreamConnector, DEFAULT_MAX_CONSECUTIVE_DECODE_ERRORS};
pub use types::{Channel, MarketRecord, SubscriptionRequest, Tick};
pub use upbit::{decode_frame, UPBIT_WS_URL};

use async_trait::async_trait;

/// Receiver of normalized records
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Handle one record; the connector waits for this before reading on
    async fn process(&self, record: MarketRecord);
}
