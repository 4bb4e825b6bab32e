//! Check command implementation

use crate::cache::LatestValueCache;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::data::build_backend;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Also require the cache to be reachable
    #[arg(long)]
    pub require_cache: bool,
}

impl CheckArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        config.validate()?;
        println!("Configuration: ok");

        let backend = build_backend(&config.storage)?;
        match backend.health().await {
            Ok(()) => println!("Storage ({}): ok", backend.name()),
            Err(e) => {
                println!("Storage ({}): FAILED - {}", backend.name(), e);
                return Err(e.into());
            }
        }

        match LatestValueCache::open(&config.cache, Arc::new(SystemClock)).await {
            Some(cache) => println!("Cache ({}): ok", cache.store_name()),
            None if self.require_cache => anyhow::bail!("cache unreachable"),
            None => println!("Cache: unavailable, collector would run without it"),
        }

        Ok(())
    }
}
