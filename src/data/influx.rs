//! InfluxDB v2 backend over the HTTP write API

use super::storage::{Point, StorageBackend};
use crate::config::InfluxConfig;
use crate::error::StorageError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt::Write as _;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Writes points as line protocol to `/api/v2/write`
pub struct InfluxBackend {
    client: Client,
    config: InfluxConfig,
}

impl InfluxBackend {
    pub fn new(config: InfluxConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl StorageBackend for InfluxBackend {
    fn name(&self) -> &'static str {
        "influx"
    }

    async fn health(&self) -> Result<(), StorageError> {
        let response = self.client.get(self.endpoint("/health")).send().await?;
        let status = response.status();

        let health: HealthResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Unhealthy(format!("HTTP {}: {}", status, e)))?;

        if health.status != "pass" {
            return Err(StorageError::Unhealthy(
                health.message.unwrap_or(health.status),
            ));
        }

        tracing::debug!(url = %self.config.url, "InfluxDB healthy");
        Ok(())
    }

    async fn write(&self, points: &[Point]) -> Result<(), StorageError> {
        let body = points
            .iter()
            .filter_map(to_line_protocol)
            .collect::<Vec<_>>()
            .join("\n");

        if body.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.endpoint("/api/v2/write"))
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.config.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        tracing::debug!(url = %self.config.url, "InfluxDB backend closed");
        Ok(())
    }
}

/// Render one point as a line-protocol line.
///
/// Non-finite field values are dropped; a point left with no fields yields `None`.
pub fn to_line_protocol(point: &Point) -> Option<String> {
    let mut line = String::with_capacity(128);
    escape_into(&mut line, point.measurement, &[',', ' ']);
    line.push_str(",symbol=");
    escape_into(&mut line, &point.symbol, &[',', '=', ' ']);

    let mut separator = ' ';
    for (key, value) in &point.fields {
        if !value.is_finite() {
            continue;
        }
        line.push(separator);
        escape_into(&mut line, key, &[',', '=', ' ']);
        let _ = write!(line, "={}", value);
        separator = ',';
    }

    if separator == ' ' {
        return None;
    }

    let _ = write!(line, " {}", point.timestamp_ns);
    Some(line)
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for c in raw.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}
