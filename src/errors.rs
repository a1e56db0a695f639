// src/errors.rs

//! Crate-wide error types and aliases.

use thiserror::Error;

/// Why a single task failed, or could not be admitted.
///
/// These travel across the task boundary as values: admission failures are
/// returned synchronously from `submit`, everything else is delivered to the
/// [`EventSink`](crate::events::EventSink) as a typed error event or recorded
/// in the persisted record's `errors` entries. Nothing in the engine panics
/// or throws across tasks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The concurrency cap was reached; no task was created. Rejected
    /// submissions are never queued; callers retry later.
    #[error("Maximum concurrent tasks reached ({limit} running). Please wait for a task to complete.")]
    AdmissionRejected { limit: usize },

    /// The backend executable could not start (not found, permission denied,
    /// or its stdin could not be fed). No output chunks were produced and no
    /// record is written for this path.
    #[error("failed to start backend '{program}': {message}")]
    SpawnFailure { program: String, message: String },

    /// The backend ran to completion but reported failure. A full record is
    /// still produced, with the exit code noted in its `errors`.
    #[error("backend exited with code {code}")]
    NonZeroExit { code: i32 },

    /// The user requested cancellation. The record is produced once the
    /// process actually exits, marked with a cancellation note.
    #[error("task cancelled by user")]
    Cancelled,

    /// The execution record could not be written to storage.
    #[error("failed to persist execution record '{record_id}': {message}")]
    PersistenceFailure { record_id: String, message: String },
}

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ForgeError>;
