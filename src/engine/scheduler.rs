// src/engine/scheduler.rs

//! Async shell around the task registry.
//!
//! The [`Scheduler`] exposes the public task API (`submit`, `cancel`,
//! `get`, `list`) and drives one pipeline per admitted task:
//!
//! 1. start a per-task [`ChangeTracker`] on the working directory
//! 2. compose the prompt and hand the invocation to the [`CommandBackend`]
//! 3. forward every output chunk to the [`EventSink`] as it arrives,
//!    appending it to the task's accumulated output
//! 4. on exit: stop the tracker, parse the output metadata, build and
//!    persist the execution record, finalize the registry entry, and emit
//!    exactly one terminal event
//!
//! Tokio schedules handlers preemptively, so the registry sits behind a
//! mutex; the lock is only ever held for short synchronous sections and
//! never across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::ForgeConfig;
use crate::engine::registry::TaskRegistry;
use crate::engine::FinalOutcome;
use crate::errors::TaskError;
use crate::events::{epoch_ms, EventSink, StreamChunk, StreamKind};
use crate::exec::{BackendInvocation, CommandBackend, OutputChunk};
use crate::prompt;
use crate::store;
use crate::store::RecordDraft;
use crate::types::{SubmitRequest, Task, TaskId};
use crate::watch::{ChangeSet, ChangeTracker};

/// Capacity of the per-task chunk channel between backend and pipeline.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Scheduler construction parameters.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Hard cap on concurrently running tasks.
    pub max_concurrent: usize,
    /// Backend program name or path.
    pub backend_program: String,
    /// Fixed flags passed on every backend invocation.
    pub backend_args: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let cfg = ForgeConfig::default();
        Self {
            max_concurrent: cfg.scheduler.max_concurrent,
            backend_program: cfg.backend.program,
            backend_args: cfg.backend.args,
        }
    }
}

impl SchedulerConfig {
    pub fn from_config(cfg: &ForgeConfig) -> Self {
        Self {
            max_concurrent: cfg.scheduler.max_concurrent,
            backend_program: cfg.backend.program.clone(),
            backend_args: cfg.backend.args.clone(),
        }
    }
}

/// Public entry point for task orchestration.
///
/// Cheap to clone; all clones share one registry. Must live inside a Tokio
/// runtime, since `submit` spawns the per-task pipeline.
pub struct Scheduler<B: CommandBackend + 'static> {
    inner: Arc<Inner<B>>,
}

impl<B: CommandBackend + 'static> Clone for Scheduler<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<B> {
    registry: Mutex<TaskRegistry>,
    /// Per-task advisory cancellation channels, removed at finalization.
    cancels: Mutex<HashMap<TaskId, oneshot::Sender<()>>>,
    backend: B,
    sink: Arc<dyn EventSink>,
    config: SchedulerConfig,
}

impl<B: CommandBackend + 'static> std::fmt::Debug for Scheduler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<B: CommandBackend + 'static> Scheduler<B> {
    pub fn new(config: SchedulerConfig, backend: B, sink: Arc<dyn EventSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(TaskRegistry::new(config.max_concurrent)),
                cancels: Mutex::new(HashMap::new()),
                backend,
                sink,
                config,
            }),
        }
    }

    /// Submit a task for immediate execution.
    ///
    /// Never blocks waiting for capacity: at the concurrency cap the request
    /// is rejected synchronously and no task is created. On admission the
    /// pipeline runs in the background; progress and termination arrive via
    /// the event sink.
    pub fn submit(&self, request: SubmitRequest) -> Result<TaskId, TaskError> {
        let task_id = uuid::Uuid::new_v4().to_string();
        let start_time = now_rfc3339();

        let task = lock(&self.inner.registry).admit(&request, task_id.clone(), start_time)?;

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        lock(&self.inner.cancels).insert(task_id.clone(), cancel_tx);

        info!(
            task = %task_id,
            project = %task.project.name,
            agent = %task.agent.name,
            "task submitted"
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_pipeline(inner, task, request, cancel_rx));

        Ok(task_id)
    }

    /// Request cancellation of a running task.
    ///
    /// Advisory: the backend is sent a termination signal and the task's
    /// visible status flips to `cancelled` immediately, but the running
    /// counter and the record wait for the process's actual exit. Returns
    /// false for unknown or already-terminal tasks.
    pub fn cancel(&self, task_id: &str) -> bool {
        if !lock(&self.inner.registry).mark_cancel_requested(task_id) {
            return false;
        }

        if let Some(cancel_tx) = lock(&self.inner.cancels).remove(task_id) {
            // A send error means the pipeline already passed the point of
            // listening; the exit path will still observe the request flag.
            let _ = cancel_tx.send(());
        }

        info!(task = %task_id, "cancellation requested");
        self.inner.sink.on_chunk(StreamChunk {
            task_id: task_id.to_string(),
            kind: StreamKind::Status,
            data: "Cancellation requested; waiting for backend to exit".to_string(),
            timestamp_ms: epoch_ms(),
        });

        true
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        lock(&self.inner.registry).get(task_id)
    }

    pub fn list(&self) -> Vec<Task> {
        lock(&self.inner.registry).list()
    }

    /// Drop finished tasks from the registry.
    pub fn clear_finished(&self) -> usize {
        lock(&self.inner.registry).clear_finished()
    }

    pub fn running_count(&self) -> usize {
        lock(&self.inner.registry).running_count()
    }
}

/// Lock a mutex, recovering from poisoning.
///
/// Registry state stays consistent even if a holder panicked mid-section:
/// every mutation is a single synchronous call on the pure core.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Drive one task from admission to its terminal event.
async fn run_pipeline<B: CommandBackend>(
    inner: Arc<Inner<B>>,
    task: Task,
    request: SubmitRequest,
    cancel_rx: oneshot::Receiver<()>,
) {
    let task_id = task.id.clone();
    let working_dir = request.project.path.clone();
    let mut warnings = Vec::new();

    emit_status(&inner, &task_id, "Starting backend CLI...");

    // Per-task tracker: created for this window, consumed at exit. If the
    // watcher cannot start we still run the task; the record then carries
    // empty change sets plus a warning, which beats failing the execution.
    let tracker = match ChangeTracker::start(&working_dir) {
        Ok(tracker) => Some(tracker),
        Err(err) => {
            warn!(task = %task_id, error = %err, "change tracker failed to start");
            warnings.push(format!("file change tracking unavailable: {err}"));
            None
        }
    };

    let composed_prompt = prompt::compose_prompt(&request.agent, &request.user_prompt);

    let invocation = BackendInvocation {
        program: inner.config.backend_program.clone(),
        args: inner.config.backend_args.clone(),
        cwd: working_dir.clone(),
        stdin_payload: composed_prompt.clone(),
    };

    let (chunk_tx, mut chunk_rx) = mpsc::channel::<OutputChunk>(CHUNK_CHANNEL_CAPACITY);
    let mut run_fut = inner.backend.run(invocation, chunk_tx, cancel_rx);

    // Stream chunks while the backend runs. Chunks are appended to the
    // task's accumulated output and forwarded immediately, no batching.
    let mut chunks_open = true;
    let run_result = loop {
        tokio::select! {
            chunk = chunk_rx.recv(), if chunks_open => {
                match chunk {
                    Some(chunk) => forward_chunk(&inner, &task_id, chunk),
                    None => chunks_open = false,
                }
            }
            result = &mut run_fut => break result,
        }
    };
    drop(run_fut);

    // The backend resolved and its senders are dropped; drain what's still
    // buffered so the accumulated output is complete.
    while let Some(chunk) = chunk_rx.recv().await {
        forward_chunk(&inner, &task_id, chunk);
    }

    match run_result {
        Err(err) => {
            // Spawn-path failure: no chunks were produced, no record is
            // written; the tracker is discarded unconsumed.
            drop(tracker);
            let error = TaskError::SpawnFailure {
                program: inner.config.backend_program.clone(),
                message: format!("{err:#}"),
            };
            finalize_and_report(
                &inner,
                &task_id,
                FinalOutcome::Failed {
                    error: error.clone(),
                    record_id: None,
                },
                None,
                Some(error),
            );
        }
        Ok(exit) => {
            let changes = match tracker {
                Some(tracker) => tracker.stop().await,
                None => ChangeSet::default(),
            };

            let cancelled = lock(&inner.registry).cancel_requested(&task_id);
            let snapshot = lock(&inner.registry).get(&task_id);
            let Some(snapshot) = snapshot else {
                // Unreachable in practice: tasks are never removed while
                // running.
                warn!(task = %task_id, "task vanished from registry before finalization");
                return;
            };

            if !prompt::has_metadata(&snapshot.output) {
                warnings.push(
                    "no commit metadata block found in backend output; using defaults".to_string(),
                );
            }
            let metadata = prompt::parse_metadata(&snapshot.output);

            let record_id = store::next_record_id();
            let record = store::build_record(
                RecordDraft {
                    task: &snapshot,
                    exit_code: exit.code,
                    changes,
                    metadata,
                    composed_prompt,
                    cancelled,
                    warnings,
                },
                record_id.clone(),
            );

            match store::persist(&working_dir, &record) {
                Ok(_) => {
                    let outcome = if cancelled {
                        FinalOutcome::Cancelled {
                            record_id: record_id.clone(),
                        }
                    } else if exit.code == 0 {
                        FinalOutcome::Completed {
                            record_id: record_id.clone(),
                        }
                    } else {
                        FinalOutcome::Failed {
                            error: TaskError::NonZeroExit { code: exit.code },
                            record_id: Some(record_id.clone()),
                        }
                    };
                    finalize_and_report(&inner, &task_id, outcome, Some(record), None);
                }
                Err(err) => {
                    // Persistence failures are surfaced, never swallowed;
                    // other in-flight tasks are unaffected.
                    let error = TaskError::PersistenceFailure {
                        record_id,
                        message: err.to_string(),
                    };
                    finalize_and_report(
                        &inner,
                        &task_id,
                        FinalOutcome::Failed {
                            error: error.clone(),
                            record_id: None,
                        },
                        None,
                        Some(error),
                    );
                }
            }
        }
    }
}

/// Append to the accumulated output and forward to the sink, preserving
/// arrival order. Status chunks are engine-originated and never appended.
fn forward_chunk<B>(inner: &Inner<B>, task_id: &str, chunk: OutputChunk) {
    if chunk.kind != StreamKind::Status {
        lock(&inner.registry).append_output(task_id, &chunk.data);
    }
    inner.sink.on_chunk(StreamChunk {
        task_id: task_id.to_string(),
        kind: chunk.kind,
        data: chunk.data,
        timestamp_ms: epoch_ms(),
    });
}

fn emit_status<B>(inner: &Inner<B>, task_id: &str, message: &str) {
    inner.sink.on_chunk(StreamChunk {
        task_id: task_id.to_string(),
        kind: StreamKind::Status,
        data: message.to_string(),
        timestamp_ms: epoch_ms(),
    });
}

/// Finalize the task exactly once and emit its single terminal event.
fn finalize_and_report<B>(
    inner: &Inner<B>,
    task_id: &str,
    outcome: FinalOutcome,
    record: Option<crate::store::ExecutionRecord>,
    error: Option<TaskError>,
) {
    // The cancel channel is gone either way now.
    lock(&inner.cancels).remove(task_id);

    let finalized = lock(&inner.registry).finalize(task_id, outcome, now_rfc3339());
    let Some(task) = finalized else {
        // Already finalized by an earlier path; emitting again would break
        // the one-terminal-event contract.
        debug!(task = %task_id, "skipping duplicate terminal event");
        return;
    };

    match (record, error) {
        (Some(record), _) => inner.sink.on_complete(task, record),
        (None, Some(error)) => inner.sink.on_error(task, error),
        (None, None) => {
            warn!(task = %task_id, "terminal event with neither record nor error");
        }
    }
}
