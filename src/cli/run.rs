//! Run command implementation

use crate::clock::SystemClock;
use crate::config::Config;
use crate::pipeline::Collector;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the configured symbols (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(short, long)]
    pub duration: Option<u64>,
}

impl RunArgs {
    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        if !self.symbols.is_empty() {
            config.feed.symbols = self.symbols.clone();
        }

        let collector = Collector::build(&config, Arc::new(SystemClock)).await?;

        let duration = self.duration;
        let shutdown = async move {
            match duration {
                Some(secs) => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                        _ = tokio::signal::ctrl_c() => {}
                    }
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    }
                }
            }
        };

        let stats = collector.run_until(shutdown).await;

        tracing::info!(
            ticks = stats.ticks_processed,
            orderbooks = stats.orderbooks_processed,
            writes = stats.persister.total_writes(),
            write_errors = stats.persister.errors,
            "Collector finished"
        );

        Ok(())
    }
}
