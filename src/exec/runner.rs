// src/exec/runner.rs

//! The real backend process runner.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::errors::Result;
use crate::events::StreamKind;
use crate::exec::backend::{BackendInvocation, CommandBackend, OutputChunk, ProcessExit};

/// Size of the pipe read buffer. Chunks are forwarded as read, so this only
/// bounds the largest single chunk, not throughput.
const READ_BUF_SIZE: usize = 8192;

/// Runs the backend CLI as a real child process.
///
/// - The composed prompt is written to stdin, then stdin is closed to
///   signal end-of-input.
/// - Stdout and stderr are pumped as raw read chunks in arrival order.
/// - A cancellation request sends SIGTERM and keeps waiting: if the backend
///   ignores the signal there is no forced-kill escalation here; the task
///   stays running until the process independently exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliBackend;

impl CliBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CommandBackend for CliBackend {
    fn run(
        &self,
        invocation: BackendInvocation,
        chunks: mpsc::Sender<OutputChunk>,
        cancel: oneshot::Receiver<()>,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessExit>> + Send + '_>> {
        Box::pin(run_process(invocation, chunks, cancel))
    }
}

async fn run_process(
    invocation: BackendInvocation,
    chunks: mpsc::Sender<OutputChunk>,
    mut cancel: oneshot::Receiver<()>,
) -> Result<ProcessExit> {
    info!(
        program = %invocation.program,
        cwd = %invocation.cwd.display(),
        "starting backend process"
    );

    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .current_dir(&invocation.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning backend process '{}'", invocation.program))?;

    // Pumps first, so a large prompt and early backend output cannot
    // deadlock on two full pipes.
    let stdout_pump = child
        .stdout
        .take()
        .map(|out| tokio::spawn(pump(out, StreamKind::Stdout, chunks.clone())));
    let stderr_pump = child
        .stderr
        .take()
        .map(|err| tokio::spawn(pump(err, StreamKind::Stderr, chunks.clone())));
    // The pumps hold the only remaining senders; the scheduler's receiver
    // closes once both finish.
    drop(chunks);

    // Deliver the prompt over stdin, then drop the handle to close the pipe
    // and signal end-of-input.
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(invocation.stdin_payload.as_bytes())
            .await
            .context("writing composed prompt to backend stdin")?;
        stdin
            .shutdown()
            .await
            .context("closing backend stdin")?;
    }

    // Either the process exits on its own (normal case), or a cancellation
    // request arrives first. Cancellation is advisory: signal, then keep
    // waiting for the authoritative exit event.
    let status = tokio::select! {
        status = child.wait() => status,
        cancel = &mut cancel => {
            if cancel.is_ok() {
                info!("cancellation requested; sending termination signal to backend");
                terminate(&mut child);
            } else {
                debug!("cancel channel closed without explicit cancellation");
            }
            child.wait().await
        }
    }
    .context("waiting for backend process")?;

    // Normalize a signal death to a concrete failure code.
    let code = status.code().unwrap_or(1);

    if let Some(handle) = stdout_pump {
        let _ = handle.await;
    }
    if let Some(handle) = stderr_pump {
        let _ = handle.await;
    }

    info!(exit_code = code, success = status.success(), "backend process exited");

    Ok(ProcessExit { code })
}

/// Forward raw reads from one pipe until EOF.
async fn pump(
    mut stream: impl AsyncReadExt + Unpin,
    kind: StreamKind,
    tx: mpsc::Sender<OutputChunk>,
) {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let data = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(OutputChunk { kind, data }).await.is_err() {
                    // Receiver gone; keep draining so the pipe can't fill.
                    continue;
                }
            }
            Err(err) => {
                debug!(?kind, error = %err, "pipe read ended with error");
                break;
            }
        }
    }
}

/// Send an advisory termination signal to the child.
#[cfg(unix)]
fn terminate(child: &mut Child) {
    match child.id() {
        Some(pid) => {
            // SAFETY: signalling our own child process id.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
        None => debug!("backend already reaped; no signal sent"),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        tracing::warn!(error = %err, "failed to signal backend process");
    }
}
