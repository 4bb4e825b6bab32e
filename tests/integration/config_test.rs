//! Configuration loading from files

use market_ingest::config::{Config, StorageConfig};
use market_ingest::error::ConfigError;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_example_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml.example");
    let config = Config::load(path).unwrap();

    assert_eq!(config.buffer.capacity, 1500);
    assert_eq!(config.buffer.flush_threshold, 150);
    assert_eq!(config.stats.report_every, 50);
    assert!(matches!(config.storage, StorageConfig::Influx(_)));
}

#[test]
fn test_load_parquet_config_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [feed]
        symbols = ["KRW-BTC", "KRW-XRP"]

        [storage]
        backend = "parquet"
        output_dir = "/tmp/market-ingest"
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.feed.symbols.len(), 2);
    assert!(matches!(config.storage, StorageConfig::Parquet(_)));
}

#[test]
fn test_load_rejects_invalid_buffer() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [buffer]
        capacity = 100
        flush_threshold = 200
        "#
    )
    .unwrap();

    let err = Config::load(file.path()).unwrap_err();
    let config_err = err.downcast_ref::<ConfigError>().unwrap();
    assert!(matches!(
        config_err,
        ConfigError::Buffer {
            field: "flush_threshold",
            ..
        }
    ));
}

#[test]
fn test_load_rejects_malformed_toml() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[buffer\ncapacity = ").unwrap();
    assert!(Config::load(file.path()).is_err());
}
