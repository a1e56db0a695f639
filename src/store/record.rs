// src/store/record.rs

//! The execution record and its assembly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::prompt::OutputMetadata;
use crate::types::{AgentProfile, ProjectRef, Task};
use crate::watch::ChangeSet;

/// Immutable audit entry summarizing one terminated task.
///
/// Created exactly once per terminated task, persisted, and never updated
/// afterwards. `record_id` is the termination timestamp (ISO-8601,
/// millisecond precision, UTC) and doubles as the sort key and, with `:`
/// replaced for filesystem portability, the storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub record_id: String,
    pub project: ProjectRef,
    pub agent: AgentProfile,
    pub working_directory: PathBuf,
    pub exit_code: i32,
    pub user_prompt: String,
    pub composed_prompt: String,
    /// Complete accumulated backend output (stdout and stderr interleaved
    /// in arrival order).
    pub raw_output: String,
    /// Title derived from the output's metadata block, or the fixed default.
    pub title: String,
    pub summary: String,
    pub files_written: Vec<String>,
    pub files_deleted: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Inputs gathered by the pipeline for one record.
#[derive(Debug)]
pub struct RecordDraft<'a> {
    pub task: &'a Task,
    pub exit_code: i32,
    pub changes: ChangeSet,
    pub metadata: OutputMetadata,
    pub composed_prompt: String,
    /// Whether the user requested cancellation before the exit.
    pub cancelled: bool,
    /// Degradations observed along the way (tracker failure, missing
    /// metadata marker, ...).
    pub warnings: Vec<String>,
}

/// Assemble the immutable record for a terminated task.
pub fn build_record(draft: RecordDraft<'_>, record_id: String) -> ExecutionRecord {
    let mut errors = Vec::new();
    if draft.cancelled {
        errors.push("task cancelled by user; backend was sent a termination signal".to_string());
    }
    if draft.exit_code != 0 {
        errors.push(format!("backend exited with code {}", draft.exit_code));
    }

    ExecutionRecord {
        record_id,
        project: draft.task.project.clone(),
        agent: draft.task.agent.clone(),
        working_directory: draft.task.project.path.clone(),
        exit_code: draft.exit_code,
        user_prompt: draft.task.prompt.clone(),
        composed_prompt: draft.composed_prompt,
        raw_output: draft.task.output.clone(),
        title: draft.metadata.title,
        summary: draft.metadata.summary,
        files_written: draft.changes.written,
        files_deleted: draft.changes.deleted,
        warnings: draft.warnings,
        errors,
    }
}
