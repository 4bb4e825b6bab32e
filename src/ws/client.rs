//! WebSocket client with ping/pong keepalive

use super::types::{WsConfig, WsFrame};
use crate::error::ConnectionError;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Floor for the keepalive period; `interval_at` rejects zero
const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

/// Opens WebSocket connections for a fixed URL
///
/// Reconnection is the caller's job; see [`super::Backoff`] and
/// [`crate::feed::StreamConnector::run_forever`].
#[derive(Debug, Clone)]
pub struct WsClient {
    config: WsConfig,
}

impl WsClient {
    /// Create a new WebSocket client with the given configuration
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Create a new client with just a URL using default config
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(WsConfig::new(url))
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Perform the WebSocket handshake
    pub async fn connect(&self) -> Result<WsConnection, ConnectionError> {
        tracing::info!(url = %self.config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = connect_async(&self.config.url)
            .await
            .map_err(|e| ConnectionError::Handshake(e.to_string()))?;

        let (write, read) = ws_stream.split();

        let period = self.config.ping_interval.max(MIN_PING_INTERVAL);
        let mut ping_interval = interval_at(Instant::now() + period, period);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(url = %self.config.url, "WebSocket connected");

        Ok(WsConnection {
            write,
            read,
            ping_interval,
            pong_timeout: self.config.pong_timeout,
            pong_deadline: None,
        })
    }
}

/// One open WebSocket session
pub struct WsConnection {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    ping_interval: Interval,
    pong_timeout: Duration,
    pong_deadline: Option<Instant>,
}

impl WsConnection {
    /// Send a text frame
    pub async fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        self.write
            .send(Message::Text(text))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    /// Wait for the next data frame
    ///
    /// Control frames are handled here: pings are answered, pongs clear the
    /// keepalive deadline, and a close frame ends the session.
    pub async fn next_frame(&mut self) -> Result<WsFrame, ConnectionError> {
        loop {
            let deadline = self.pong_deadline;

            tokio::select! {
                msg = self.read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => return Ok(WsFrame::Text(text)),
                        Some(Ok(Message::Binary(data))) => return Ok(WsFrame::Binary(data)),
                        Some(Ok(Message::Ping(data))) => {
                            self.write.send(Message::Pong(data)).await
                                .map_err(|e| ConnectionError::Transport(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.pong_deadline = None;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Received close frame");
                            return Err(ConnectionError::Closed);
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
                        None => return Err(ConnectionError::Closed),
                    }
                }

                _ = self.ping_interval.tick() => {
                    if self.pong_deadline.is_none() {
                        self.write.send(Message::Ping(vec![])).await
                            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
                        self.pong_deadline = Some(Instant::now() + self.pong_timeout);
                    }
                }

                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {
                    return Err(ConnectionError::PongTimeout(self.pong_timeout));
                }
            }
        }
    }

    /// Send a close frame and shut the sink down
    pub async fn close(&mut self) {
        if let Err(e) = self.write.send(Message::Close(None)).await {
            tracing::debug!(error = %e, "Close frame not sent");
        }
        if let Err(e) = self.write.close().await {
            tracing::debug!(error = %e, "Sink close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_ws_client_creation() {
        let client = WsClient::with_url("wss://example.com");
        assert_eq!(client.url(), "wss://example.com");
    }

    #[test]
    fn test_ws_client_with_config() {
        let config = WsConfig::new("wss://test.com").ping_interval(Duration::from_secs(15));

        let client = WsClient::new(config);
        assert_eq!(client.url(), "wss://test.com");
        assert_eq!(client.config().ping_interval, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_ws_client_connection_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = WsClient::with_url(format!("ws://{}", addr));
        let result = client.connect().await;
        assert!(matches!(result, Err(ConnectionError::Handshake(_))));
    }

    #[tokio::test]
    async fn test_zero_ping_interval_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let config = WsConfig::new(format!("ws://{}", addr)).ping_interval(Duration::ZERO);
        let handle = tokio::spawn(async move { WsClient::new(config).connect().await.is_ok() });

        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_ws_connection_reads_frames_and_answers_ping() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let subscription = ws.next().await.unwrap().unwrap();
            assert_eq!(subscription, Message::Text("hello".to_string()));

            ws.send(Message::Ping(vec![1, 2])).await.unwrap();
            ws.send(Message::Binary(b"{\"a\":1}".to_vec())).await.unwrap();

            let pong = ws.next().await.unwrap().unwrap();
            assert_eq!(pong, Message::Pong(vec![1, 2]));

            ws.send(Message::Close(None)).await.unwrap();
        });

        let client = WsClient::with_url(format!("ws://{}", addr));
        let mut conn = client.connect().await.unwrap();
        conn.send_text("hello".to_string()).await.unwrap();

        let frame = conn.next_frame().await.unwrap();
        assert_eq!(frame, WsFrame::Binary(b"{\"a\":1}".to_vec()));

        let end = conn.next_frame().await;
        assert!(matches!(end, Err(ConnectionError::Closed)));

        server.await.unwrap();
    }
}
