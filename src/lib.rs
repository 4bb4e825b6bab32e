//! market-ingest: real-time market data ingestion for Upbit
//!
//! This library provides the core components for:
//! - Supervised WebSocket streams for the ticker and order book channels
//! - Normalization of exchange frames into typed records
//! - A bounded ingestion buffer with size, interval and watermark flushes
//! - Batch persistence to InfluxDB or Parquet with derived order book analytics
//! - A latest-tick cache backed by Redis or memory
//! - Structured logging and Prometheus metrics

pub mod buffer;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod feed;
pub mod orderbook;
pub mod pipeline;
pub mod telemetry;
pub mod ws;
