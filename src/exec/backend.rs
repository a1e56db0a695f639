// src/exec/backend.rs

//! Pluggable command backend abstraction.
//!
//! The scheduler talks to a `CommandBackend` instead of spawning processes
//! itself. This keeps the per-task pipeline testable: production code uses
//! [`CliBackend`](crate::exec::runner::CliBackend), and tests provide their
//! own implementation that emits scripted chunks, mutates the working
//! directory, or holds the "process" open until released, without any OS
//! process involved.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};

use crate::errors::Result;
use crate::events::StreamKind;

/// Everything needed to run the backend once.
#[derive(Debug, Clone)]
pub struct BackendInvocation {
    /// Program name or path (configurable; `claude` by default).
    pub program: String,
    /// Fixed flags requesting non-interactive, single-shot output mode.
    pub args: Vec<String>,
    /// Working directory the backend operates in.
    pub cwd: PathBuf,
    /// The composed prompt, delivered over stdin (never as an argument)
    /// to avoid shell-escaping hazards with large or special-laden text.
    pub stdin_payload: String,
}

/// A raw piece of backend output, exactly as read from the OS pipe.
///
/// No batching, no line buffering: partial lines arrive as separate chunks.
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub kind: StreamKind,
    pub data: String,
}

/// Terminal result of a backend run that actually started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Normalized exit code: an absent code (killed by signal) is reported
    /// as 1 so downstream record building sees a deterministic integer.
    pub code: i32,
}

/// Trait abstracting how a backend invocation is executed.
///
/// Contract:
/// - chunks are sent on `chunks` in pipe order (per stream) while running;
/// - the future resolves with [`ProcessExit`] only after the process has
///   exited and all output has been forwarded;
/// - an `Err` is the spawn-failure path: the backend never started (or
///   never received its input) and no chunks were produced;
/// - a message on `cancel` is an advisory termination request: the
///   implementation signals the process but still waits for the real exit,
///   which stays authoritative.
pub trait CommandBackend: Send + Sync {
    fn run(
        &self,
        invocation: BackendInvocation,
        chunks: mpsc::Sender<OutputChunk>,
        cancel: oneshot::Receiver<()>,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessExit>> + Send + '_>>;
}
