//! WebSocket client library
//!
//! Provides a reusable WebSocket transport with ping/pong keepalive and a
//! bounded reconnection backoff policy.

mod backoff;
mod client;
mod types;

pub use backoff::Backoff;
pub use client::{WsClient, WsConnection};
pub use types::{WsConfig, WsFrame};
