// src/engine/registry.rs

//! Pure task registry state machine.
//!
//! This module contains a synchronous, deterministic registry that owns
//! every [`Task`] for its lifetime and enforces:
//! - the admission cap (at most `max_concurrent` tasks running),
//! - the status transitions of the task state machine,
//! - idempotent finalization: the running counter is decremented and the
//!   terminal outcome applied exactly once per task, no matter how many
//!   paths race to finalize it.
//!
//! It has **no** channels, no Tokio types, no clock and performs no IO;
//! ids and timestamps are injected by the shell. The async scheduler in
//! [`scheduler`](crate::engine::scheduler) wraps it in a mutex and is the
//! only writer.

use std::collections::HashMap;

use tracing::debug;

use crate::engine::FinalOutcome;
use crate::errors::TaskError;
use crate::types::{SubmitRequest, Task, TaskId, TaskStatus};

#[derive(Debug)]
struct TaskEntry {
    task: Task,
    /// Set once a terminal outcome has been applied; later finalization
    /// attempts become no-ops.
    finalized: bool,
    /// Set when the user requested cancellation; the exit path reads this
    /// to pick the terminal status.
    cancel_requested: bool,
}

/// Registry of all tasks, running and finished.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, TaskEntry>,
    running: usize,
    max_concurrent: usize,
}

impl TaskRegistry {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            running: 0,
            max_concurrent,
        }
    }

    /// Admit a task or reject it synchronously.
    ///
    /// Admission is a hard cap, not a queue: at or above the cap the request
    /// is rejected and no task is created. On admission the task starts in
    /// `Running` (there is no queued state) and the running counter is
    /// incremented; it is decremented only by [`finalize`](Self::finalize).
    pub fn admit(
        &mut self,
        request: &SubmitRequest,
        task_id: TaskId,
        start_time: String,
    ) -> Result<Task, TaskError> {
        if self.running >= self.max_concurrent {
            return Err(TaskError::AdmissionRejected {
                limit: self.max_concurrent,
            });
        }

        let task = Task {
            id: task_id.clone(),
            project: request.project.clone(),
            agent: request.agent.clone(),
            prompt: request.user_prompt.clone(),
            status: TaskStatus::Running,
            start_time,
            end_time: None,
            output: String::new(),
            error: None,
            record_id: None,
        };

        self.tasks.insert(
            task_id,
            TaskEntry {
                task: task.clone(),
                finalized: false,
                cancel_requested: false,
            },
        );
        self.running += 1;

        debug!(task = %task.id, running = self.running, "task admitted");
        Ok(task)
    }

    /// Append a stream chunk to the task's accumulated output.
    pub fn append_output(&mut self, task_id: &str, data: &str) {
        if let Some(entry) = self.tasks.get_mut(task_id) {
            entry.task.output.push_str(data);
        }
    }

    /// Record a cancellation request and flip the visible status.
    ///
    /// The flip is advisory, for observer responsiveness; the authoritative
    /// terminal transition (counter decrement, record) happens in
    /// [`finalize`](Self::finalize) once the process actually exits.
    /// Returns false for unknown or already-terminal tasks.
    pub fn mark_cancel_requested(&mut self, task_id: &str) -> bool {
        match self.tasks.get_mut(task_id) {
            Some(entry) if !entry.finalized && entry.task.status == TaskStatus::Running => {
                entry.cancel_requested = true;
                entry.task.status = TaskStatus::Cancelled;
                true
            }
            _ => false,
        }
    }

    /// Whether cancellation was requested for this task.
    pub fn cancel_requested(&self, task_id: &str) -> bool {
        self.tasks
            .get(task_id)
            .is_some_and(|entry| entry.cancel_requested)
    }

    /// Apply a terminal outcome exactly once.
    ///
    /// The first call per task decrements the running counter, applies the
    /// outcome and returns the final task snapshot; every later call is a
    /// no-op returning `None`.
    pub fn finalize(
        &mut self,
        task_id: &str,
        outcome: FinalOutcome,
        end_time: String,
    ) -> Option<Task> {
        let entry = self.tasks.get_mut(task_id)?;
        if entry.finalized {
            debug!(task = %task_id, "finalize called twice; ignoring");
            return None;
        }

        entry.finalized = true;
        self.running = self.running.saturating_sub(1);
        entry.task.end_time = Some(end_time);

        match outcome {
            FinalOutcome::Completed { record_id } => {
                entry.task.status = TaskStatus::Completed;
                entry.task.record_id = Some(record_id);
            }
            FinalOutcome::Cancelled { record_id } => {
                entry.task.status = TaskStatus::Cancelled;
                entry.task.record_id = Some(record_id);
                entry.task.error = Some(TaskError::Cancelled.to_string());
            }
            FinalOutcome::Failed { error, record_id } => {
                entry.task.status = TaskStatus::Failed;
                entry.task.record_id = record_id;
                entry.task.error = Some(error.to_string());
            }
        }

        debug!(
            task = %task_id,
            status = ?entry.task.status,
            running = self.running,
            "task finalized"
        );
        Some(entry.task.clone())
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(task_id).map(|entry| entry.task.clone())
    }

    /// All tasks, oldest first (start times are RFC 3339, so string order is
    /// chronological).
    pub fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().map(|e| e.task.clone()).collect();
        tasks.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        tasks
    }

    /// Drop finished tasks from the registry; running tasks are kept.
    pub fn clear_finished(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, entry| !entry.finalized);
        before - self.tasks.len()
    }

    pub fn running_count(&self) -> usize {
        self.running
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
