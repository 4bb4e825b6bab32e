use clap::Parser;
use market_ingest::cli::{Cli, Commands};
use market_ingest::config::{Config, StorageConfig};
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        eprintln!("Warning: {} not found, using defaults", cli.config);
        Config::from_env()?
    };

    // Initialize telemetry
    market_ingest::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting market data collection");
            args.execute(config).await?;
        }
        Commands::Check(args) => {
            args.execute(&config).await?;
        }
        Commands::Config => {
            let mut shown = config.clone();
            if let StorageConfig::Influx(influx) = &mut shown.storage {
                if !influx.token.is_empty() {
                    influx.token = "********".to_string();
                }
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }
    }

    Ok(())
}
