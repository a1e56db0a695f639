// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the backend CLI for a
//! task, using `tokio::process::Command`, streaming its output back to the
//! scheduler chunk by chunk, and reporting the exit.
//!
//! - [`backend`] provides the `CommandBackend` trait plus the invocation and
//!   chunk types the scheduler exchanges with it; tests substitute fake
//!   implementations.
//! - [`runner`] contains `CliBackend`, the concrete implementation that
//!   spawns the real process, feeds the composed prompt over stdin, and
//!   pumps stdout/stderr.

pub mod backend;
pub mod runner;

pub use backend::{BackendInvocation, CommandBackend, OutputChunk, ProcessExit};
pub use runner::CliBackend;
