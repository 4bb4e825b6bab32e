//! Supervised streaming connection for one channel

use super::types::{Channel, MarketRecord, SubscriptionRequest};
use super::upbit::decode_frame;
use super::RecordSink;
use crate::error::ConnectionError;
use crate::telemetry::{increment_counter, CounterMetric};
use crate::ws::{Backoff, WsClient, WsConfig, WsConnection, WsFrame};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Default number of back-to-back undecodable frames that forces a reconnect
pub const DEFAULT_MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 100;

/// Lifecycle of a single connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Idle,
    Connecting,
    Streaming,
    Reconnecting { attempt: u32 },
    Stopped,
}

/// One long-lived subscription to one channel
pub struct StreamConnector {
    channel: Channel,
    client: WsClient,
    max_consecutive_decode_errors: u32,
    state: watch::Sender<ConnectorState>,
}

impl StreamConnector {
    pub fn new(channel: Channel, config: WsConfig) -> Self {
        let (state, _) = watch::channel(ConnectorState::Idle);
        Self {
            channel,
            client: WsClient::new(config),
            max_consecutive_decode_errors: DEFAULT_MAX_CONSECUTIVE_DECODE_ERRORS,
            state,
        }
    }

    /// Reconnect after this many consecutive decode failures (0 disables)
    pub fn max_consecutive_decode_errors(mut self, n: u32) -> Self {
        self.max_consecutive_decode_errors = n;
        self
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Watch this connector's state transitions
    pub fn state(&self) -> watch::Receiver<ConnectorState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectorState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectorState) {
        self.state.send_replace(state);
    }

    /// Open the transport connection
    pub async fn connect(&self) -> Result<WsConnection, ConnectionError> {
        self.client.connect().await
    }

    /// Send the subscription request without waiting for an acknowledgement
    pub async fn subscribe(
        &self,
        conn: &mut WsConnection,
        symbols: &[String],
    ) -> Result<(), ConnectionError> {
        let request = SubscriptionRequest::new(self.channel, symbols);
        let json = request
            .to_json()
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        conn.send_text(json).await?;

        tracing::info!(
            channel = %self.channel,
            ticket = %request.ticket,
            symbols = ?symbols,
            "Sent subscription"
        );
        Ok(())
    }

    /// Raw frames of one connection, ending only with an error
    pub fn receive(
        conn: &mut WsConnection,
    ) -> impl Stream<Item = Result<WsFrame, ConnectionError>> + '_ {
        futures_util::stream::unfold(conn, |conn| async move {
            let frame = conn.next_frame().await;
            Some((frame, conn))
        })
    }

    /// Supervise connect → subscribe → receive until `cancel` fires.
    ///
    /// Every decoded record is handed to `sink` before the next frame is
    /// read, so a slow sink stalls only this channel.
    pub async fn run_forever(
        &self,
        symbols: &[String],
        sink: &dyn RecordSink,
        cancel: &CancellationToken,
    ) {
        let config = self.client.config();
        let mut backoff = Backoff::new(config.initial_reconnect_delay, config.max_reconnect_delay);

        while !cancel.is_cancelled() {
            match self.run_session(symbols, sink, cancel, &mut backoff).await {
                Ok(()) => break,
                Err(e) => {
                    if cancel.is_cancelled() {
                        break;
                    }

                    let delay = backoff.next_delay();
                    let attempt = backoff.attempts();
                    self.set_state(ConnectorState::Reconnecting { attempt });
                    increment_counter(CounterMetric::Reconnects(self.channel), 1);

                    tracing::warn!(
                        channel = %self.channel,
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Stream failed, reconnecting"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.set_state(ConnectorState::Stopped);
        tracing::info!(channel = %self.channel, "Connector stopped");
    }

    /// One connection lifetime. `Ok` only when cancelled.
    async fn run_session(
        &self,
        symbols: &[String],
        sink: &dyn RecordSink,
        cancel: &CancellationToken,
        backoff: &mut Backoff,
    ) -> Result<(), ConnectionError> {
        self.set_state(ConnectorState::Connecting);

        let mut conn = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            conn = self.connect() => conn?,
        };

        if let Err(e) = self.subscribe(&mut conn, symbols).await {
            conn.close().await;
            return Err(e);
        }

        backoff.reset();
        self.set_state(ConnectorState::Streaming);

        let outcome = {
            let frames = Self::receive(&mut conn);
            tokio::pin!(frames);
            self.pump(&mut frames, sink, cancel).await
        };

        conn.close().await;
        tracing::info!(channel = %self.channel, "Connection closed");
        outcome
    }

    async fn pump<S>(
        &self,
        frames: &mut S,
        sink: &dyn RecordSink,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectionError>
    where
        S: Stream<Item = Result<WsFrame, ConnectionError>> + Unpin,
    {
        let mut consecutive_errors: u32 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = frames.next() => next,
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(e),
                None => return Err(ConnectionError::Closed),
            };

            match decode_frame(self.channel, frame.as_bytes(), Utc::now()) {
                Ok(Some(record)) => {
                    consecutive_errors = 0;
                    self.deliver(record, sink).await;
                }
                Ok(None) => {
                    consecutive_errors = 0;
                    tracing::trace!(channel = %self.channel, len = frame.len(), "Ignored frame");
                }
                Err(e) => {
                    consecutive_errors += 1;
                    increment_counter(CounterMetric::DecodeErrors(self.channel), 1);
                    tracing::warn!(
                        channel = %self.channel,
                        error = %e,
                        preview = %String::from_utf8_lossy(frame.as_bytes()).chars().take(100).collect::<String>(),
                        "Failed to decode frame"
                    );

                    if self.max_consecutive_decode_errors > 0
                        && consecutive_errors >= self.max_consecutive_decode_errors
                    {
                        return Err(ConnectionError::DecodeStorm(consecutive_errors));
                    }
                }
            }
        }
    }

    async fn deliver(&self, record: MarketRecord, sink: &dyn RecordSink) {
        increment_counter(CounterMetric::RecordsReceived(self.channel), 1);
        sink.process(record).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::SinkExt;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    #[derive(Default)]
    struct CollectingSink {
        records: Mutex<Vec<MarketRecord>>,
    }

    #[async_trait]
    impl RecordSink for CollectingSink {
        async fn process(&self, record: MarketRecord) {
            self.records.lock().push(record);
        }
    }

    fn ticker_frame(price: u64) -> String {
        format!(r#"{{"type":"ticker","code":"KRW-BTC","trade_price":{}}}"#, price)
    }

    fn fast_config(url: String) -> WsConfig {
        WsConfig::new(url)
            .initial_delay(Duration::from_millis(20))
            .max_delay(Duration::from_millis(50))
    }

    #[test]
    fn test_connector_starts_idle() {
        let connector = StreamConnector::new(Channel::Ticker, WsConfig::new("ws://localhost:1"));
        assert_eq!(connector.channel(), Channel::Ticker);
        assert_eq!(connector.current_state(), ConnectorState::Idle);
    }

    #[tokio::test]
    async fn test_run_forever_delivers_in_order_and_skips_bad_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let subscription = ws.next().await.unwrap().unwrap();
            let text = subscription.into_text().unwrap();
            assert!(text.contains(r#""type":"ticker""#));

            ws.send(Message::Binary(ticker_frame(1).into_bytes())).await.unwrap();
            ws.send(Message::Text("garbage".to_string())).await.unwrap();
            ws.send(Message::Text(r#"{"status":"UP"}"#.to_string())).await.unwrap();
            ws.send(Message::Binary(ticker_frame(2).into_bytes())).await.unwrap();

            // Hold the connection open until the client goes away
            while ws.next().await.is_some() {}
        });

        let connector = Arc::new(StreamConnector::new(
            Channel::Ticker,
            fast_config(format!("ws://{}", addr)),
        ));
        let sink = Arc::new(CollectingSink::default());
        let cancel = CancellationToken::new();

        let task = {
            let connector = connector.clone();
            let sink = sink.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let symbols = vec!["KRW-BTC".to_string()];
                connector.run_forever(&symbols, sink.as_ref(), &cancel).await;
            })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.records.lock().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("records not delivered");

        assert_eq!(connector.current_state(), ConnectorState::Streaming);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("connector did not stop")
            .unwrap();

        assert_eq!(connector.current_state(), ConnectorState::Stopped);

        let records = sink.records.lock();
        let prices: Vec<String> = records
            .iter()
            .map(|r| match r {
                MarketRecord::Tick(t) => t.trade_price.to_string(),
                MarketRecord::OrderBook(_) => unreachable!(),
            })
            .collect();
        assert_eq!(prices, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_run_forever_reconnects_after_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for price in [10u64, 20] {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let _subscription = ws.next().await;
                ws.send(Message::Text(ticker_frame(price))).await.unwrap();
                if price == 20 {
                    while ws.next().await.is_some() {}
                }
                // First session: drop the socket to force a reconnect
            }
        });

        let connector = Arc::new(StreamConnector::new(
            Channel::Ticker,
            fast_config(format!("ws://{}", addr)),
        ));
        let sink = Arc::new(CollectingSink::default());
        let cancel = CancellationToken::new();
        let mut states = connector.state();

        let task = {
            let connector = connector.clone();
            let sink = sink.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let symbols = vec!["KRW-BTC".to_string()];
                connector.run_forever(&symbols, sink.as_ref(), &cancel).await;
            })
        };

        let saw_reconnect = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                states.changed().await.unwrap();
                if matches!(*states.borrow(), ConnectorState::Reconnecting { .. }) {
                    return true;
                }
            }
        })
        .await
        .unwrap_or(false);
        assert!(saw_reconnect);

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.records.lock().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("second session did not deliver");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_forever_retries_unreachable_until_cancelled() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = StreamConnector::new(Channel::Orderbook, fast_config(format!("ws://{}", addr)));
        let sink = CollectingSink::default();
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                cancel.cancel();
            })
        };

        let symbols = vec!["KRW-BTC".to_string()];
        tokio::time::timeout(
            Duration::from_secs(5),
            connector.run_forever(&symbols, &sink, &cancel),
        )
        .await
        .expect("connector ignored cancellation");

        canceller.await.unwrap();
        assert_eq!(connector.current_state(), ConnectorState::Stopped);
        assert!(sink.records.lock().is_empty());
    }

    #[tokio::test]
    async fn test_decode_storm_forces_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _subscription = ws.next().await;
            for _ in 0..3 {
                ws.send(Message::Text("{".to_string())).await.unwrap();
            }
            while ws.next().await.is_some() {}
        });

        let connector = Arc::new(
            StreamConnector::new(Channel::Ticker, fast_config(format!("ws://{}", addr)))
                .max_consecutive_decode_errors(3),
        );
        let mut states = connector.state();
        let cancel = CancellationToken::new();

        let task = {
            let connector = connector.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let sink = CollectingSink::default();
                let symbols = vec!["KRW-BTC".to_string()];
                connector.run_forever(&symbols, &sink, &cancel).await;
            })
        };

        let saw_reconnect = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                states.changed().await.unwrap();
                if matches!(*states.borrow(), ConnectorState::Reconnecting { .. }) {
                    return true;
                }
            }
        })
        .await
        .unwrap_or(false);
        assert!(saw_reconnect);

        cancel.cancel();
        task.await.unwrap();
    }
}
