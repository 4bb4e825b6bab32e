//! Ingestion orchestration
//!
//! Wires the channel connectors, ingestion buffer, latest-value cache and
//! batch persister together and owns their lifecycle.

mod collector;
mod ingest;
mod probe;
mod stats;

pub use collector::{Collector, CollectorState};
pub use ingest::Pipeline;
pub use probe::{ProcfsProbe, ResourceProbe, ResourceUsage};
pub use stats::CollectionStats;
