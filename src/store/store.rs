// src/store/store.rs

//! JSON-file persistence for execution records.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::store::record::ExecutionRecord;

/// Fixed subdirectory of the project root holding record files.
pub const RECORDS_DIR: &str = ".taskforge/records";

/// Last issued record-id timestamp, in epoch milliseconds.
///
/// Record ids must sort in task-termination order even when two tasks
/// terminate within the same millisecond, so id generation bumps past the
/// previous value when the clock hasn't advanced.
static LAST_ID_MS: AtomicI64 = AtomicI64::new(0);

/// Produce the next record id: the current UTC time at millisecond
/// precision, strictly greater than any id issued before it by this
/// process.
pub fn next_record_id() -> String {
    let now = Utc::now().timestamp_millis();
    let prev = LAST_ID_MS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(if now > last { now } else { last + 1 })
        })
        .unwrap_or(now);
    let ms = if now > prev { now } else { prev + 1 };

    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Directory holding the record files for a project.
pub fn records_dir(project_root: &Path) -> PathBuf {
    project_root.join(RECORDS_DIR)
}

/// File path for one record id (`:` replaced for portability).
pub fn record_path(project_root: &Path, record_id: &str) -> PathBuf {
    records_dir(project_root).join(format!("{}.json", record_id.replace(':', "-")))
}

/// Write a record to durable storage.
///
/// Append-only: each record is written once to its own file and never
/// rewritten by the core.
pub fn persist(project_root: &Path, record: &ExecutionRecord) -> Result<PathBuf> {
    let dir = records_dir(project_root);
    std::fs::create_dir_all(&dir)?;

    let path = record_path(project_root, &record.record_id);
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&path, json)?;

    debug!(path = %path.display(), "persisted execution record");
    Ok(path)
}

/// List all records for a project, most recent first.
///
/// Re-reads the directory on every call; malformed files are logged and
/// skipped so one corrupt record cannot hide the rest of the history.
pub fn list(project_root: &Path) -> Result<Vec<ExecutionRecord>> {
    let dir = records_dir(project_root);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();

    // Filenames are timestamp-derived, so lexicographic order is
    // chronological; reverse for newest-first.
    files.sort();
    files.reverse();

    let mut records = Vec::with_capacity(files.len());
    for path in files {
        match read_record(&path) {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable record file");
            }
        }
    }

    Ok(records)
}

/// Fetch one record by id. Missing or unreadable records yield `None`.
pub fn get(project_root: &Path, record_id: &str) -> Result<Option<ExecutionRecord>> {
    let path = record_path(project_root, record_id);
    if !path.exists() {
        return Ok(None);
    }

    match read_record(&path) {
        Ok(record) => Ok(Some(record)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "record file unreadable");
            Ok(None)
        }
    }
}

/// Remove one record file. Returns whether a file was actually removed.
pub fn delete(project_root: &Path, record_id: &str) -> Result<bool> {
    let path = record_path(project_root, record_id);
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(&path)?;
    Ok(true)
}

/// Remove every record file for a project. Returns the number removed.
pub fn delete_all(project_root: &Path) -> Result<usize> {
    let dir = records_dir(project_root);
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }

    Ok(removed)
}

fn read_record(path: &Path) -> Result<ExecutionRecord> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
