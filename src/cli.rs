// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! NOTE: this expects `clap` to be built with the `derive` feature, e.g.:
//! `clap = { version = "4.5.53", features = ["derive"] }` in `Cargo.toml`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `taskforge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskforge",
    version,
    about = "Dispatch prompts to an AI coding backend and record every execution.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `taskforge.toml` in the current working directory, if it
    /// exists. Built-in defaults apply otherwise.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKFORGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a prompt against a project directory and record the execution.
    Run {
        /// Project directory the backend works in (and the watch root).
        #[arg(long, value_name = "DIR", default_value = ".")]
        project: String,

        /// Agent profile to act as (name or id from the config file).
        #[arg(long, value_name = "NAME")]
        agent: Option<String>,

        /// Backend program to invoke (overrides the config file).
        #[arg(long, value_name = "PROGRAM")]
        backend: Option<String>,

        /// The prompt text to send to the backend.
        prompt: String,
    },

    /// List recorded executions for a project, most recent first.
    History {
        #[arg(long, value_name = "DIR", default_value = ".")]
        project: String,

        /// Show at most this many records.
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Print one stored execution record as JSON.
    Show {
        #[arg(long, value_name = "DIR", default_value = ".")]
        project: String,

        /// Record id as shown by `history`.
        record_id: String,
    },

    /// Delete all stored execution records for a project.
    Clear {
        #[arg(long, value_name = "DIR", default_value = ".")]
        project: String,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
