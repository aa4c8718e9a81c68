//! Measurement logger - append-only CSV store of counter snapshots
//!
//! Records are either buffered in memory and written by `flush()`, or
//! written one at a time by `log_immediate()`. The 11-column header is
//! written exactly once, when the store file is created.
//!
//! Storage failures never propagate: they are logged as warnings and the
//! operation returns its neutral result (0 written, empty list, None).

use crate::domain::types::{epoch_secs, format_datetime, round_to, Stats};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Store columns in file order
pub const COLUMNS: [&str; 11] = [
    "timestamp",
    "datetime",
    "person_count",
    "max_count",
    "average_count",
    "total_detections",
    "total_frames",
    "frames_with_persons",
    "detection_rate",
    "fps",
    "running_time",
];

/// One row of the measurement store
///
/// Field order matches [`COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Epoch seconds, full precision
    pub timestamp: f64,
    pub datetime: String,
    pub person_count: u32,
    pub max_count: u32,
    /// 2 decimals
    pub average_count: f64,
    pub total_detections: u64,
    pub total_frames: u64,
    pub frames_with_persons: u64,
    /// 3 decimals
    pub detection_rate: f64,
    /// 2 decimals
    pub fps: f64,
    /// Seconds, 2 decimals
    pub running_time: f64,
}

impl LogRecord {
    pub fn from_stats(stats: &Stats, at: DateTime<Local>) -> Self {
        Self {
            timestamp: epoch_secs(&at),
            datetime: format_datetime(&at),
            person_count: stats.current_count,
            max_count: stats.max_count,
            average_count: round_to(stats.average_count, 2),
            total_detections: stats.total_detections,
            total_frames: stats.total_frames,
            frames_with_persons: stats.frames_with_persons,
            detection_rate: round_to(stats.detection_rate, 3),
            fps: round_to(stats.fps, 2),
            running_time: round_to(stats.running_time, 2),
        }
    }
}

/// Overview of everything in the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_records: usize,
    pub max_person_count: u32,
    pub avg_person_count: f64,
    /// Value of the last record, not a sum
    pub total_detections_at_end: u64,
    pub avg_fps: f64,
    /// Value of the last record
    pub total_running_time: f64,
    pub first_record_timestamp: f64,
    pub last_record_timestamp: f64,
    pub first_record_datetime: String,
    pub last_record_datetime: String,
}

impl SummaryStats {
    fn from_records(records: &[LogRecord]) -> Option<Self> {
        let first = records.first()?;
        let last = records.last()?;
        let n = records.len() as f64;

        let person_sum: f64 = records.iter().map(|r| f64::from(r.person_count)).sum();
        let fps_sum: f64 = records.iter().map(|r| r.fps).sum();

        Some(Self {
            total_records: records.len(),
            max_person_count: records.iter().map(|r| r.person_count).max().unwrap_or(0),
            avg_person_count: round_to(person_sum / n, 2),
            total_detections_at_end: last.total_detections,
            avg_fps: round_to(fps_sum / n, 2),
            total_running_time: last.running_time,
            first_record_timestamp: first.timestamp,
            last_record_timestamp: last.timestamp,
            first_record_datetime: first.datetime.clone(),
            last_record_datetime: last.datetime.clone(),
        })
    }
}

pub struct MeasurementLogger {
    store_path: PathBuf,
    enabled: bool,
    /// Records waiting for `flush()`, in insertion order
    buffer: Vec<LogRecord>,
}

impl MeasurementLogger {
    /// Create a logger for `store_path`
    ///
    /// When enabled and the store does not exist yet, it is created with the
    /// header immediately. A disabled logger never touches the filesystem.
    pub fn new(store_path: impl AsRef<Path>, enabled: bool) -> Self {
        let store_path = store_path.as_ref().to_path_buf();

        if enabled && !store_path.exists() {
            match create_store(&store_path) {
                Ok(()) => info!(path = %store_path.display(), "measurement_store_created"),
                Err(e) => {
                    warn!(path = %store_path.display(), error = %e, "measurement_store_create_failed")
                }
            }
        }

        info!(path = %store_path.display(), enabled = enabled, "measurement_logger_initialized");
        Self { store_path, enabled, buffer: Vec::new() }
    }

    /// Buffer a record built from `stats`; no I/O
    pub fn log(&mut self, stats: &Stats) {
        if !self.enabled {
            return;
        }
        self.buffer.push(LogRecord::from_stats(stats, Local::now()));
    }

    /// Write all buffered records to the store and clear the buffer
    ///
    /// Returns the number of records written. On failure the buffer is kept
    /// so a later flush can retry.
    pub fn flush(&mut self) -> usize {
        if !self.enabled || self.buffer.is_empty() {
            return 0;
        }

        match append_records(&self.store_path, &self.buffer) {
            Ok(()) => {
                let written = self.buffer.len();
                self.buffer.clear();
                info!(path = %self.store_path.display(), records = written, "measurement_buffer_flushed");
                written
            }
            Err(e) => {
                warn!(
                    path = %self.store_path.display(),
                    pending = self.buffer.len(),
                    error = %e,
                    "measurement_flush_failed"
                );
                0
            }
        }
    }

    /// Write a single record straight to the store, bypassing the buffer
    ///
    /// Returns true if the record was written.
    pub fn log_immediate(&mut self, stats: &Stats) -> bool {
        if !self.enabled {
            return false;
        }

        let record = LogRecord::from_stats(stats, Local::now());
        match append_records(&self.store_path, std::slice::from_ref(&record)) {
            Ok(()) => {
                debug!(path = %self.store_path.display(), person_count = record.person_count, "measurement_written");
                true
            }
            Err(e) => {
                warn!(path = %self.store_path.display(), error = %e, "measurement_write_failed");
                false
            }
        }
    }

    /// Read back every record in the store, in file order
    ///
    /// A missing store yields an empty list. Rows that fail to parse are
    /// skipped with a warning.
    pub fn load_all(&self) -> Vec<LogRecord> {
        if !self.store_path.exists() {
            debug!(path = %self.store_path.display(), "measurement_store_missing");
            return Vec::new();
        }

        let mut reader = match csv::ReaderBuilder::new().has_headers(true).from_path(&self.store_path) {
            Ok(reader) => reader,
            Err(e) => {
                warn!(path = %self.store_path.display(), error = %e, "measurement_store_read_failed");
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for (row, result) in reader.deserialize::<LogRecord>().enumerate() {
            match result {
                Ok(record) => records.push(record),
                Err(e) if e.is_io_error() => {
                    warn!(path = %self.store_path.display(), error = %e, "measurement_store_read_failed");
                    return Vec::new();
                }
                Err(e) => warn!(path = %self.store_path.display(), row = row + 1, error = %e, "measurement_row_skipped"),
            }
        }
        records
    }

    /// Summary over the store, or None when it holds no records
    pub fn summary(&self) -> Option<SummaryStats> {
        SummaryStats::from_records(&self.load_all())
    }

    /// Truncate the store to just the header
    ///
    /// The buffer is not touched. Returns true if the store was recreated.
    pub fn clear(&mut self) -> bool {
        if let Err(e) = fs::remove_file(&self.store_path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.store_path.display(), error = %e, "measurement_store_remove_failed");
                return false;
            }
        }

        match create_store(&self.store_path) {
            Ok(()) => {
                info!(path = %self.store_path.display(), "measurement_store_cleared");
                true
            }
            Err(e) => {
                warn!(path = %self.store_path.display(), error = %e, "measurement_store_create_failed");
                false
            }
        }
    }

    /// Copy the store contents to a separate file
    ///
    /// Written as JSON when `destination` ends in `.json`, CSV otherwise.
    /// An empty store skips the write. Returns the number of rows exported.
    pub fn export_snapshot(&self, destination: impl AsRef<Path>) -> usize {
        let destination = destination.as_ref();
        let records = self.load_all();

        if records.is_empty() {
            info!(path = %self.store_path.display(), "snapshot_skipped_empty_store");
            return 0;
        }

        let result = if destination.extension().is_some_and(|ext| ext == "json") {
            write_json_snapshot(destination, &records)
        } else {
            write_csv_snapshot(destination, &records)
        };

        match result {
            Ok(()) => {
                info!(path = %destination.display(), records = records.len(), "snapshot_exported");
                records.len()
            }
            Err(e) => {
                warn!(path = %destination.display(), error = %e, "snapshot_export_failed");
                0
            }
        }
    }

    /// Default export destination next to the store
    pub fn default_snapshot_path(&self) -> PathBuf {
        let stem = self.store_path.file_stem().and_then(|s| s.to_str()).unwrap_or("measurements");
        self.store_path.with_file_name(format!("{}-snapshot.csv", stem))
    }

    /// Toggle logging; the buffer is kept while disabled
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        info!(enabled = enabled, pending = self.buffer.len(), "measurement_logging_toggled");
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    #[inline]
    pub fn buffered(&self) -> &[LogRecord] {
        &self.buffer
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Create (or truncate) the store with just the header
fn create_store(path: &Path) -> csv::Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(COLUMNS)?;
    writer.flush()?;
    Ok(())
}

/// Append records, writing the header first if the store is new or empty
fn append_records(path: &Path, records: &[LogRecord]) -> csv::Result<()> {
    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    ensure_parent(path)?;

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

    if needs_header {
        writer.write_record(COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_csv_snapshot(path: &Path, records: &[LogRecord]) -> anyhow::Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json_snapshot(path: &Path, records: &[LogRecord]) -> anyhow::Result<()> {
    ensure_parent(path)?;
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, records)?;
    Ok(())
}
