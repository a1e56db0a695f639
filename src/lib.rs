// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod prompt;
pub mod store;
pub mod types;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::{load_config, resolve_agent, ForgeConfig};
use crate::engine::{Scheduler, SchedulerConfig};
use crate::events::{ConsoleSink, TerminalEvent};
use crate::exec::CliBackend;
use crate::types::{ProjectRef, SubmitRequest, TaskStatus};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - scheduler / backend / console sink (for `run`)
/// - the record store (for `history` / `show` / `clear`)
/// - Ctrl-C handling (advisory cancellation)
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(args.config.as_deref().map(Path::new))?;

    match args.command {
        Command::Run {
            project,
            agent,
            backend,
            prompt,
        } => run_task(cfg, &project, agent.as_deref(), backend, prompt).await,
        Command::History { project, limit } => print_history(&project, limit),
        Command::Show { project, record_id } => print_record(&project, &record_id),
        Command::Clear { project } => clear_records(&project),
    }
}

/// Submit one task, stream its output to the terminal, and wait for the
/// terminal event.
async fn run_task(
    cfg: ForgeConfig,
    project: &str,
    agent: Option<&str>,
    backend_override: Option<String>,
    prompt: String,
) -> Result<()> {
    let project_dir = std::fs::canonicalize(project)
        .with_context(|| format!("project directory not accessible: {project}"))?;
    if !project_dir.is_dir() {
        bail!("project path is not a directory: {}", project_dir.display());
    }

    let agent_profile = resolve_agent(&cfg, agent)?;

    let mut scheduler_cfg = SchedulerConfig::from_config(&cfg);
    if let Some(program) = backend_override {
        scheduler_cfg.backend_program = program;
    }

    let sink = Arc::new(ConsoleSink::new());
    let scheduler = Scheduler::new(
        scheduler_cfg,
        CliBackend::new(),
        Arc::clone(&sink) as Arc<dyn events::EventSink>,
    );

    let request = SubmitRequest {
        project: ProjectRef::from_dir(&project_dir),
        agent: agent_profile,
        user_prompt: prompt,
    };

    let task_id = scheduler.submit(request)?;
    debug!(%task_id, "task submitted from CLI");

    // Ctrl-C → advisory cancellation; the record is still produced once the
    // backend exits.
    {
        let scheduler = scheduler.clone();
        let task_id = task_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                scheduler.cancel(&task_id);
            }
        });
    }

    match sink.wait().await {
        TerminalEvent::Complete { task, record } => {
            eprintln!();
            eprintln!("record:  {}", record.record_id);
            eprintln!("title:   {}", record.title);
            eprintln!("summary: {}", record.summary);
            if !record.files_written.is_empty() {
                eprintln!("written: {}", record.files_written.join(", "));
            }
            if !record.files_deleted.is_empty() {
                eprintln!("deleted: {}", record.files_deleted.join(", "));
            }
            for warning in &record.warnings {
                eprintln!("warning: {warning}");
            }

            match task.status {
                TaskStatus::Completed => {
                    info!(task = %task.id, "task completed");
                    Ok(())
                }
                TaskStatus::Cancelled => bail!("task was cancelled (record {})", record.record_id),
                _ => bail!(
                    "backend exited with code {} (record {})",
                    record.exit_code,
                    record.record_id
                ),
            }
        }
        TerminalEvent::Error { error, .. } => Err(error.into()),
    }
}

fn print_history(project: &str, limit: Option<usize>) -> Result<()> {
    let records = store::list(Path::new(project))?;
    if records.is_empty() {
        println!("no recorded executions");
        return Ok(());
    }

    let shown = limit.unwrap_or(records.len());
    for record in records.iter().take(shown) {
        println!(
            "{}  exit={}  {}  [{}]",
            record.record_id, record.exit_code, record.title, record.agent.name
        );
    }
    if records.len() > shown {
        println!("... and {} more", records.len() - shown);
    }
    Ok(())
}

fn print_record(project: &str, record_id: &str) -> Result<()> {
    match store::get(Path::new(project), record_id)? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => bail!("no record with id {record_id}"),
    }
}

fn clear_records(project: &str) -> Result<()> {
    let removed = store::delete_all(Path::new(project))?;
    println!("removed {removed} record(s)");
    Ok(())
}
