// src/types.rs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Canonical task id type used throughout the engine (a UUID v4 string).
pub type TaskId = String;

/// Permission flags carried by an agent profile.
///
/// These are instructions woven into the composed prompt, not an OS-level
/// sandbox; the backend is asked to respect them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPermissions {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
}

impl Default for AgentPermissions {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
            delete: false,
        }
    }
}

/// An execution profile: who the backend should act as and what it may touch.
///
/// Immutable value supplied by the caller; the engine never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    /// System-level instruction describing the agent's purpose.
    pub role: String,
    #[serde(default)]
    pub permissions: AgentPermissions,
}

impl AgentProfile {
    /// Built-in profile used when the caller does not name one.
    pub fn default_profile() -> Self {
        Self {
            id: "default".to_string(),
            name: "Default Agent".to_string(),
            role: "A general-purpose software engineering assistant.".to_string(),
            permissions: AgentPermissions::default(),
        }
    }
}

/// The project a task runs against. `path` doubles as the task's working
/// directory and the root the change tracker watches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

impl ProjectRef {
    /// Derive a project reference from a directory path.
    ///
    /// The id is stable across runs: the first 12 hex chars of a blake3 hash
    /// of the path string.
    pub fn from_dir(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = project_id(&path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        Self { id, name, path }
    }
}

fn project_id(path: &Path) -> String {
    let digest = blake3::hash(path.to_string_lossy().as_bytes());
    digest.to_hex().as_str()[..12].to_string()
}

/// Task lifecycle status.
///
/// There is no `queued` state: admission is an immediate accept/reject
/// decision, never deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// One in-flight or finished execution of a prompt against a backend,
/// scoped to one working directory.
///
/// Owned exclusively by the task registry for its lifetime; observers and
/// events receive clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub project: ProjectRef,
    pub agent: AgentProfile,
    pub prompt: String,
    pub status: TaskStatus,
    /// RFC 3339 timestamps; millisecond precision, UTC.
    pub start_time: String,
    pub end_time: Option<String>,
    /// Stdout and stderr chunks appended in arrival order.
    pub output: String,
    pub error: Option<String>,
    /// Id of the persisted execution record, once one exists.
    pub record_id: Option<String>,
}

/// A request to run one prompt against one project directory.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub project: ProjectRef,
    pub agent: AgentProfile,
    pub user_prompt: String,
}
