//! CSV test log.
//!
//! One row per attempt. Column names and order are consumed by external
//! dashboards and must not change.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use swapbench_core::TestRecord;
use thiserror::Error;

pub const LOG_COLUMNS: [&str; 22] = [
    "timestamp",
    "run_id",
    "source_id",
    "target_id",
    "template_id",
    "provider",
    "attempt",
    "source_face_index",
    "target_face_index",
    "restoration_model",
    "detection_order",
    "model_type",
    "success",
    "error_kind",
    "error_message",
    "http_status",
    "wall_clock_ms",
    "inference_seconds",
    "cost_units",
    "remaining_credits",
    "request_id",
    "result_image",
];

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("cannot write test log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("test log {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A flattened [`TestRecord`] as stored in the log. Field order is the
/// column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub timestamp: String,
    pub run_id: String,
    pub source_id: String,
    pub target_id: String,
    pub template_id: Option<String>,
    pub provider: String,
    pub attempt: u32,
    pub source_face_index: u32,
    pub target_face_index: u32,
    pub restoration_model: Option<String>,
    pub detection_order: Option<String>,
    pub model_type: Option<String>,
    pub success: bool,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub http_status: Option<u16>,
    pub wall_clock_ms: u64,
    pub inference_seconds: Option<f64>,
    pub cost_units: Option<f64>,
    pub remaining_credits: Option<f64>,
    pub request_id: Option<String>,
    /// Saved file name (relative to the results directory) or provider URL.
    pub result_image: Option<String>,
}

impl LogRow {
    pub fn from_record(record: &TestRecord, run_id: &str, result_image: Option<String>) -> Self {
        let options = &record.options;
        let result = &record.result;
        Self {
            timestamp: record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            run_id: run_id.to_string(),
            source_id: record.source_id.clone(),
            target_id: record.target_id.clone(),
            template_id: options.template_id.clone(),
            provider: record.provider.as_str().to_string(),
            attempt: record.attempt,
            source_face_index: options.source_face_index,
            target_face_index: options.target_face_index,
            restoration_model: options.restoration_model.clone(),
            detection_order: options.detection_order.map(|o| o.as_str().to_string()),
            model_type: options.model_type.map(|m| m.as_str().to_string()),
            success: result.success,
            error_kind: result.error_kind.map(|k| k.as_str().to_string()),
            // keep each row on one physical line
            error_message: result
                .error_message
                .as_ref()
                .map(|m| m.replace(['\r', '\n'], " ")),
            http_status: result.http_status,
            wall_clock_ms: result.wall_clock_millis,
            inference_seconds: result.inference_seconds,
            cost_units: result.cost_units,
            remaining_credits: result.remaining_credits,
            request_id: result.request_id.clone(),
            result_image,
        }
    }
}

/// Append-only CSV writer. Every row is flushed before `append` returns.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvSink {
    /// Open (or create) the log. The header row is written only when the
    /// file is new or empty.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let io_err = |source: std::io::Error| SinkError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;

        tracing::debug!(path = %path.display(), needs_header, "opened test log");
        let writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, row: &LogRow) -> Result<(), SinkError> {
        self.writer.serialize(row).map_err(|source| SinkError::Csv {
            path: self.path.clone(),
            source,
        })?;
        self.writer.flush().map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Read every row of an existing log.
pub fn read_log(path: &Path) -> Result<Vec<LogRow>, SinkError> {
    let csv_err = |source: csv::Error| SinkError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    reader
        .deserialize()
        .collect::<Result<Vec<LogRow>, _>>()
        .map_err(csv_err)
}
