//! Error taxonomy for the ingestion pipeline
//!
//! Each failure class maps to one recovery policy:
//! - [`ConnectionError`]: channel-level, retried with backoff until cancelled
//! - [`DecodeError`]: per-frame, logged and skipped
//! - [`PersistenceError`]: per-batch, logged and the batch is dropped
//! - [`CacheError`]: logged only, pipeline continues
//! - [`ConfigError`]: fatal at startup
//! - [`StartupError`]: invalid config or unhealthy storage, fatal

use thiserror::Error;

/// Streaming transport failures
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Handshake or TCP/TLS connect failed
    #[error("connection failed: {0}")]
    Handshake(String),
    /// Reading from or writing to an open connection failed
    #[error("transport error: {0}")]
    Transport(String),
    /// Keepalive ping went unanswered
    #[error("pong not received within {0:?}")]
    PongTimeout(std::time::Duration),
    /// Peer closed the stream
    #[error("connection closed by peer")]
    Closed,
    /// Too many consecutive undecodable frames
    #[error("{0} consecutive frames failed to decode")]
    DecodeStorm(u32),
}

/// A single inbound frame could not be turned into a record
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Storage backend failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage rejected write with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("storage unhealthy: {0}")]
    Unhealthy(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

/// A batch could not be persisted; the batch is discarded
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write {points} points: {source}")]
    Write {
        points: usize,
        #[source]
        source: StorageError,
    },
}

/// Latest-value cache failures (never fatal)
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),
}

/// Invalid configuration, detected before any connection is opened
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("buffer.{field} is invalid: {reason}")]
    Buffer { field: &'static str, reason: String },
    #[error("feed.{field} is invalid: {reason}")]
    Feed { field: &'static str, reason: String },
    #[error("feed.symbols must not be empty")]
    NoSymbols,
    #[error("{0} must not be empty")]
    Missing(&'static str),
}

/// Conditions that prevent the collector from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("storage backend unavailable: {0}")]
    Storage(#[from] StorageError),
}
