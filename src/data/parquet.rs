//! Parquet capture backend
//!
//! Each batch becomes one file per measurement in the output directory.

use super::storage::{Point, StorageBackend};
use crate::error::StorageError;
use arrow::array::{ArrayRef, Float64Array, StringArray, TimestampNanosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Schema for one measurement: timestamp, symbol, then one nullable Float64
/// column per field
pub fn measurement_schema(field_names: &[&str]) -> Schema {
    let mut fields = vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into())),
            false,
        ),
        Field::new("symbol", DataType::Utf8, false),
    ];
    fields.extend(
        field_names
            .iter()
            .map(|name| Field::new(*name, DataType::Float64, true)),
    );
    Schema::new(fields)
}

/// Writes batches to Snappy-compressed Parquet files
pub struct ParquetBackend {
    output_dir: PathBuf,
    files_written: AtomicU64,
}

impl ParquetBackend {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            files_written: AtomicU64::new(0),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn files_written(&self) -> u64 {
        self.files_written.load(Ordering::Relaxed)
    }

    /// File path for a measurement written at `timestamp`; a numeric suffix
    /// is added if that name is already taken
    pub fn file_path(&self, measurement: &str, timestamp: DateTime<Utc>) -> PathBuf {
        let stem = format!("{}_{}", measurement, timestamp.format("%Y%m%d_%H%M%S_%3f"));
        let mut path = self.output_dir.join(format!("{}.parquet", stem));
        let mut n = 1;
        while path.exists() {
            path = self.output_dir.join(format!("{}_{}.parquet", stem, n));
            n += 1;
        }
        path
    }

    fn write_measurement(&self, path: &Path, points: &[&Point]) -> Result<(), StorageError> {
        let field_names: Vec<&str> = points
            .first()
            .map(|p| p.fields.iter().map(|(name, _)| *name).collect())
            .unwrap_or_default();

        let schema = Arc::new(measurement_schema(&field_names));

        let timestamps: Vec<i64> = points.iter().map(|p| p.timestamp_ns).collect();
        let symbols: Vec<&str> = points.iter().map(|p| p.symbol.as_str()).collect();

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(TimestampNanosecondArray::from(timestamps).with_timezone("UTC")),
            Arc::new(StringArray::from(symbols)),
        ];
        for name in &field_names {
            let values: Vec<Option<f64>> = points.iter().map(|p| p.field(name)).collect();
            columns.push(Arc::new(Float64Array::from(values)));
        }

        let batch = RecordBatch::try_new(schema.clone(), columns)?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
        writer.write(&batch)?;
        writer.close()?;

        self.files_written.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(path = ?path, count = points.len(), "Wrote points to Parquet");

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for ParquetBackend {
    fn name(&self) -> &'static str {
        "parquet"
    }

    async fn health(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.output_dir)?;
        let metadata = fs::metadata(&self.output_dir)?;
        if metadata.permissions().readonly() {
            return Err(StorageError::Unhealthy(format!(
                "{} is read-only",
                self.output_dir.display()
            )));
        }
        Ok(())
    }

    async fn write(&self, points: &[Point]) -> Result<(), StorageError> {
        if points.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(&self.output_dir)?;

        let mut by_measurement: BTreeMap<&str, Vec<&Point>> = BTreeMap::new();
        for point in points {
            by_measurement
                .entry(point.measurement)
                .or_default()
                .push(point);
        }

        let now = Utc::now();
        for (measurement, points) in by_measurement {
            let path = self.file_path(measurement, now);
            self.write_measurement(&path, &points)?;
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        tracing::info!(
            dir = ?self.output_dir,
            files = self.files_written(),
            "Parquet backend closed"
        );
        Ok(())
    }
}
