//! Collector lifecycle: one connector task per channel feeding one pipeline

use super::ingest::Pipeline;
use super::probe::ProcfsProbe;
use super::stats::CollectionStats;
use crate::buffer::IngestionBuffer;
use crate::cache::LatestValueCache;
use crate::clock::Clock;
use crate::config::{Config, FeedConfig};
use crate::data::{build_backend, BatchPersister};
use crate::error::StartupError;
use crate::feed::{Channel, ConnectorState, StreamConnector};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Collector lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Connecting,
    Streaming,
    Draining,
    Stopped,
}

/// Runs both channel connectors against a shared pipeline
pub struct Collector {
    symbols: Vec<String>,
    connectors: Vec<Arc<StreamConnector>>,
    pipeline: Arc<Pipeline>,
    state: Arc<watch::Sender<CollectorState>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Collector {
    pub fn new(feed: &FeedConfig, pipeline: Arc<Pipeline>) -> Self {
        let ws_config = feed.ws_config();
        let connectors = feed
            .channels
            .iter()
            .map(|channel| {
                Arc::new(
                    StreamConnector::new(*channel, ws_config.clone())
                        .max_consecutive_decode_errors(feed.max_consecutive_decode_errors),
                )
            })
            .collect();

        let (state, _) = watch::channel(CollectorState::Idle);

        Self {
            symbols: feed.symbols.clone(),
            connectors,
            pipeline,
            state: Arc::new(state),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Validate the configuration, open storage and cache, and assemble a
    /// collector. An unhealthy storage backend is fatal; an unreachable
    /// cache is not.
    pub async fn build(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, StartupError> {
        config.validate()?;

        let backend = build_backend(&config.storage)?;
        backend.health().await?;
        tracing::info!(backend = backend.name(), "Storage backend healthy");

        let cache = LatestValueCache::open(&config.cache, clock.clone()).await;

        let pipeline = Pipeline::new(
            IngestionBuffer::new(config.buffer.clone(), clock),
            BatchPersister::new(backend),
            cache,
            Arc::new(ProcfsProbe),
        )
        .report_every(config.stats.report_every);

        Ok(Self::new(&config.feed, Arc::new(pipeline)))
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn state(&self) -> watch::Receiver<CollectorState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> CollectorState {
        *self.state.borrow()
    }

    pub fn connector_states(&self) -> Vec<(Channel, ConnectorState)> {
        self.connectors
            .iter()
            .map(|c| (c.channel(), c.current_state()))
            .collect()
    }

    /// Launch one supervised connector task per channel. Only valid once,
    /// from `Idle`.
    pub fn start(&self) {
        let started = self.state.send_if_modified(|state| {
            if *state == CollectorState::Idle {
                *state = CollectorState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            tracing::warn!(state = ?self.current_state(), "Collector already started");
            return;
        }

        tracing::info!(
            symbols = ?self.symbols,
            channels = self.connectors.len(),
            "Starting collection"
        );

        let mut tasks = self.tasks.lock();
        for connector in &self.connectors {
            tasks.push(self.spawn_connector(connector.clone()));
            tasks.push(self.spawn_state_watch(connector.clone()));
        }
    }

    fn spawn_connector(&self, connector: Arc<StreamConnector>) -> JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        let symbols = self.symbols.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            connector
                .run_forever(&symbols, pipeline.as_ref(), &cancel)
                .await;
        })
    }

    /// Move `Connecting` to `Streaming` once any connector is streaming
    fn spawn_state_watch(&self, connector: Arc<StreamConnector>) -> JoinHandle<()> {
        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let mut connector_state = connector.state();

        tokio::spawn(async move {
            let streaming = tokio::select! {
                _ = cancel.cancelled() => false,
                result = connector_state.wait_for(|s| *s == ConnectorState::Streaming) => result.is_ok(),
            };

            if streaming {
                state.send_if_modified(|s| {
                    if *s == CollectorState::Connecting {
                        *s = CollectorState::Streaming;
                        true
                    } else {
                        false
                    }
                });
            }
        })
    }

    /// Cancel both connectors, wait for them, persist whatever is still
    /// buffered and close the storage backend.
    pub async fn stop(&self) -> CollectionStats {
        if matches!(
            self.current_state(),
            CollectorState::Draining | CollectorState::Stopped
        ) {
            return self.stats();
        }

        self.state.send_replace(CollectorState::Draining);
        self.cancel.cancel();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Connector task failed");
            }
        }

        if let Err(e) = self.pipeline.drain().await {
            tracing::error!(error = %e, "Final flush failed");
        }

        let backend = self.pipeline.persister().backend();
        if let Err(e) = backend.close().await {
            tracing::warn!(backend = backend.name(), error = %e, "Failed to close storage backend");
        }

        self.state.send_replace(CollectorState::Stopped);

        let stats = self.stats();
        stats.report();
        tracing::info!("Collection stopped");
        stats
    }

    /// Start, run until `shutdown` resolves, then stop gracefully
    pub async fn run_until<F>(&self, shutdown: F) -> CollectionStats
    where
        F: Future<Output = ()>,
    {
        self.start();
        shutdown.await;
        tracing::info!("Shutdown requested");
        self.stop().await
    }

    pub fn stats(&self) -> CollectionStats {
        self.pipeline.stats()
    }
}
