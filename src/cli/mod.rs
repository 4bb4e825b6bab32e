//! CLI interface for market-ingest
//!
//! Provides subcommands for:
//! - `run`: Collect market data until interrupted
//! - `check`: Probe storage and cache connectivity
//! - `config`: Show the effective configuration

mod check;
mod run;

pub use check::CheckArgs;
pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "market-ingest")]
#[command(about = "Real-time Upbit ticker and order book collector")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start collecting
    Run(RunArgs),
    /// Check storage and cache connectivity
    Check(CheckArgs),
    /// Show the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "market-ingest",
            "-c",
            "custom.toml",
            "run",
            "--symbols",
            "KRW-BTC,KRW-ETH",
            "--duration",
            "30",
        ])
        .unwrap();

        assert_eq!(cli.config, "custom.toml");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.symbols, vec!["KRW-BTC", "KRW-ETH"]);
                assert_eq!(args.duration, Some(30));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["market-ingest", "check"]).unwrap();
        assert_eq!(cli.config, "config.toml");
        assert!(matches!(cli.command, Commands::Check(_)));

        let cli = Cli::try_parse_from(["market-ingest", "config"]).unwrap();
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["market-ingest"]).is_err());
    }
}
