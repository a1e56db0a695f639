// src/events.rs

//! Outward-facing event surface.
//!
//! The engine pushes three kinds of notifications while a task runs:
//! - stream chunks (stdout/stderr/status), forwarded per OS pipe read,
//! - one completion event carrying the persisted execution record,
//! - or one error event for the record-less failure paths.
//!
//! Consumers implement [`EventSink`]: the CLI's [`ConsoleSink`] prints to
//! the terminal, a GUI could forward events over IPC, tests collect them in
//! memory. The engine depends only on the trait.

use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::Notify;

use crate::errors::TaskError;
use crate::store::ExecutionRecord;
use crate::types::Task;

/// Which stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
    /// Engine-originated progress notes (not backend output; never appended
    /// to the task's accumulated output).
    Status,
}

/// A single chunk of output, forwarded as it arrives.
///
/// Chunks are raw pipe reads: partial lines are normal, and stdout/stderr
/// are only ordered within their own stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamChunk {
    pub task_id: String,
    pub kind: StreamKind,
    pub data: String,
    pub timestamp_ms: i64,
}

/// Observer interface for task progress and termination.
///
/// Exactly one terminal call (`on_complete` or `on_error`) is made per task,
/// and only after the process has exited, the change tracker has stopped,
/// and, for `on_complete`, the record has been persisted.
pub trait EventSink: Send + Sync {
    fn on_chunk(&self, chunk: StreamChunk);
    fn on_complete(&self, task: Task, record: ExecutionRecord);
    fn on_error(&self, task: Task, error: TaskError);
}

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Terminal outcome as observed by a sink.
#[derive(Debug, Clone)]
pub enum TerminalEvent {
    Complete {
        task: Task,
        record: ExecutionRecord,
    },
    Error {
        task: Task,
        error: TaskError,
    },
}

/// `EventSink` for the CLI front-end.
///
/// Stdout chunks go to stdout untouched; stderr and status chunks go to
/// stderr. The terminal event is stashed so the caller can await it.
#[derive(Default)]
pub struct ConsoleSink {
    done: Notify,
    terminal: Mutex<Option<TerminalEvent>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the task observed by this sink to reach a terminal event.
    ///
    /// Intended for the single-task CLI flow; with several tasks sharing one
    /// sink this returns the first terminal event.
    pub async fn wait(&self) -> TerminalEvent {
        loop {
            let notified = self.done.notified();
            if let Some(event) = self.slot().clone() {
                return event;
            }
            notified.await;
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<TerminalEvent>> {
        match self.terminal.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn finish(&self, event: TerminalEvent) {
        let mut slot = self.slot();
        if slot.is_none() {
            *slot = Some(event);
        }
        drop(slot);
        self.done.notify_waiters();
    }
}

impl EventSink for ConsoleSink {
    fn on_chunk(&self, chunk: StreamChunk) {
        use std::io::Write;
        match chunk.kind {
            StreamKind::Stdout => {
                print!("{}", chunk.data);
                let _ = std::io::stdout().flush();
            }
            StreamKind::Stderr => {
                eprint!("{}", chunk.data);
            }
            StreamKind::Status => {
                eprintln!("[taskforge] {}", chunk.data);
            }
        }
    }

    fn on_complete(&self, task: Task, record: ExecutionRecord) {
        self.finish(TerminalEvent::Complete { task, record });
    }

    fn on_error(&self, task: Task, error: TaskError) {
        self.finish(TerminalEvent::Error { task, error });
    }
}
