//! End-to-end: local exchange stream through the collector into a mocked InfluxDB

use futures_util::{SinkExt, StreamExt};
use market_ingest::clock::SystemClock;
use market_ingest::config::{Config, InfluxConfig, StorageConfig};
use market_ingest::error::StartupError;
use market_ingest::pipeline::{Collector, CollectorState};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Accepts any number of connections and streams `frames_per_channel`
/// frames for whichever channel the client subscribes to
async fn spawn_exchange(frames_per_channel: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let Some(Ok(subscription)) = ws.next().await else {
                    return;
                };
                let text = subscription.into_text().unwrap_or_default();
                let is_ticker = text.contains(r#""type":"ticker""#);

                for i in 0..frames_per_channel {
                    let frame = if is_ticker {
                        format!(
                            r#"{{"type":"ticker","code":"KRW-BTC","trade_price":{},"change":"RISE"}}"#,
                            50_000_000 + i
                        )
                    } else {
                        r#"{"type":"orderbook","code":"KRW-BTC","orderbook_units":[{"ask_price":101,"ask_size":1,"bid_price":100,"bid_size":1}]}"#.to_string()
                    };
                    if ws.send(Message::Binary(frame.into_bytes())).await.is_err() {
                        return;
                    }
                }
                while ws.next().await.is_some() {}
            });
        }
    });

    format!("ws://{}", addr)
}

async fn healthy_influx() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "pass"})),
        )
        .mount(&server)
        .await;
    server
}

fn config(ws_url: String, influx_url: String) -> Config {
    let mut config = Config::default();
    config.feed.url = ws_url;
    config.feed.initial_reconnect_delay_secs = 1;
    config.buffer.capacity = 20;
    config.buffer.flush_threshold = 10;
    config.storage = StorageConfig::Influx(InfluxConfig {
        url: influx_url,
        token: "test-token".to_string(),
        org: "test-org".to_string(),
        bucket: "test-bucket".to_string(),
        timeout_secs: 2,
    });
    config
}

async fn wait_for_processed(collector: &Collector, n: u64) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while collector.stats().total_processed() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("records were not processed in time");
}

#[tokio::test]
async fn test_stream_to_influx_with_final_flush() {
    let ws_url = spawn_exchange(12).await;
    let influx = healthy_influx().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&influx)
        .await;

    let collector = Collector::build(&config(ws_url, influx.uri()), Arc::new(SystemClock))
        .await
        .unwrap();
    collector.start();

    wait_for_processed(&collector, 24).await;
    let stats = collector.stop().await;

    assert_eq!(collector.current_state(), CollectorState::Stopped);
    assert_eq!(stats.ticks_processed, 12);
    assert_eq!(stats.orderbooks_processed, 12);
    assert_eq!(stats.persister.total_writes(), 24);
    assert_eq!(stats.persister.errors, 0);
    assert_eq!(stats.buffer.len, 0);

    let writes: Vec<String> = influx
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/api/v2/write")
        .map(|r| String::from_utf8(r.body).unwrap())
        .collect();

    // Two threshold flushes of 10 plus the final flush of 4
    assert_eq!(writes.len(), 3);
    let lines: Vec<&str> = writes.iter().flat_map(|body| body.lines()).collect();
    assert_eq!(lines.len(), 24);
    assert_eq!(
        lines
            .iter()
            .filter(|l| l.starts_with("ticker_data,symbol=KRW-BTC "))
            .count(),
        12
    );
    assert_eq!(
        lines
            .iter()
            .filter(|l| l.starts_with("orderbook_summary,symbol=KRW-BTC "))
            .count(),
        12
    );

    let cache = collector.pipeline().cache().unwrap();
    let latest = cache.latest("KRW-BTC").await.unwrap();
    assert_eq!(latest.change, "RISE");
}

#[tokio::test]
async fn test_rejected_writes_are_counted_and_dropped() {
    let ws_url = spawn_exchange(10).await;
    let influx = healthy_influx().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&influx)
        .await;

    let mut config = config(ws_url, influx.uri());
    config.feed.channels = vec![market_ingest::feed::Channel::Ticker];

    let collector = Collector::build(&config, Arc::new(SystemClock))
        .await
        .unwrap();
    collector.start();

    wait_for_processed(&collector, 10).await;
    let stats = collector.stop().await;

    assert_eq!(stats.ticks_processed, 10);
    assert_eq!(stats.persister.errors, 1);
    assert_eq!(stats.persister.total_writes(), 0);
    assert_eq!(stats.persister.success_rate(), 0.0);
    assert_eq!(stats.buffer.len, 0);
}

#[tokio::test]
async fn test_unhealthy_storage_prevents_start() {
    let influx = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(serde_json::json!({"status": "fail", "message": "starting"})),
        )
        .mount(&influx)
        .await;

    let result = Collector::build(
        &config("ws://127.0.0.1:1".to_string(), influx.uri()),
        Arc::new(SystemClock),
    )
    .await;

    assert!(matches!(result, Err(StartupError::Storage(_))));
}
