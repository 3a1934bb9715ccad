//! CSV export and debug dumps.
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! failed run leaves no truncated output behind.

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::record::{COLUMNS, NormalizedRecord};
use crate::utils::timestamped_filename;
use chrono::{DateTime, Local};
use serde_json::Value as JsonValue;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Prefix of the raw listing dump written in debug mode.
pub const DEBUG_DUMP_PREFIX: &str = "api_response";

/// Destination of the export started at `at`.
pub fn export_path(config: &ExportConfig, at: DateTime<Local>) -> PathBuf {
    config
        .output_directory
        .join(timestamped_filename(&config.file_prefix, at, "csv"))
}

/// Writes `records` to a timestamped CSV in the configured directory.
pub fn export_records(
    records: &[NormalizedRecord],
    config: &ExportConfig,
    at: DateTime<Local>,
) -> Result<PathBuf, ExportError> {
    let path = export_path(config, at);
    write_csv(&path, records)?;
    tracing::info!(path = %path.display(), rows = records.len(), "Export written");
    Ok(path)
}

/// Writes the header row and one row per record to `path`.
pub fn write_csv(path: &Path, records: &[NormalizedRecord]) -> Result<(), ExportError> {
    write_atomically(path, |file| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        let csv_error = |source| ExportError::Csv {
            path: path.to_path_buf(),
            source,
        };

        writer.write_record(COLUMNS).map_err(csv_error)?;
        for record in records {
            writer.serialize(record).map_err(csv_error)?;
        }
        writer.flush().map_err(|source| write_error(path, source))
    })
}

/// Writes the combined listing document as `api_response_<timestamp>.json`.
pub fn write_debug_dump(
    dir: &Path,
    document: &JsonValue,
    at: DateTime<Local>,
) -> Result<PathBuf, ExportError> {
    let path = dir.join(timestamped_filename(DEBUG_DUMP_PREFIX, at, "json"));
    write_atomically(&path, |file| {
        serde_json::to_writer_pretty(&mut *file, document)
            .map_err(|e| write_error(&path, std::io::Error::other(e)))?;
        file.flush().map_err(|source| write_error(&path, source))
    })?;
    tracing::debug!(path = %path.display(), "Debug dump written");
    Ok(path)
}

fn write_atomically(
    path: &Path,
    write: impl FnOnce(&mut std::fs::File) -> Result<(), ExportError>,
) -> Result<(), ExportError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|source| write_error(path, source))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|source| write_error(path, source))?;
    write(temp.as_file_mut())?;
    temp.persist(path)
        .map_err(|e| write_error(path, e.error))?;
    Ok(())
}

fn write_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Write {
        path: path.to_path_buf(),
        source,
    }
}
