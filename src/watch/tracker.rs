// src/watch/tracker.rs

//! Per-task filesystem change tracking.
//!
//! A [`ChangeTracker`] watches exactly one directory for exactly one
//! execution window. The scheduler creates one per admitted task and
//! consumes it when the backend exits. Trackers are never shared across
//! tasks, so concurrent windows cannot contaminate each other's change sets.
//!
//! The `notify` watcher delivers events on its own thread; a small bridge
//! forwards them over an unbounded channel into an async collector that
//! applies them to the pure [`ChangeLog`]. Only events arriving after the
//! watch starts are seen; pre-existing files are never reported.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::watch::changelog::{ChangeLog, ChangeSet};
use crate::watch::filter::WatchFilter;

/// Cadence at which pending writes are checked for stability.
const SETTLE_TICK: Duration = Duration::from_millis(50);

/// Grace period before teardown so events still in flight from the
/// just-exited process are attributed to this window.
const STOP_DRAIN_DELAY: Duration = Duration::from_millis(150);

/// Watches one directory for the duration of one execution window.
///
/// Dropping the tracker without calling [`stop`](Self::stop) discards the
/// collected changes.
pub struct ChangeTracker {
    root: PathBuf,
    stop_tx: Option<oneshot::Sender<()>>,
    collector: Option<tokio::task::JoinHandle<ChangeLog>>,
    // Kept alive for the window; dropping it stops file watching.
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl ChangeTracker {
    /// Start watching `root` recursively.
    ///
    /// Must be called before the backend process is spawned so no mutation
    /// escapes the window.
    pub fn start(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        // Canonicalize once so we have a stable base path.
        let root = root.canonicalize().unwrap_or_else(|_| root.clone());

        let filter = WatchFilter::new(root.clone())?;

        // Channel from the blocking notify callback into the async world.
        let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();

        // Closure called synchronously by notify whenever an event arrives.
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    // A send error means the collector is gone; nothing to do.
                    let _ = event_tx.send(event);
                }
                Err(err) => {
                    // We can't log via tracing here easily, so fallback to stderr.
                    eprintln!("taskforge: file watch error: {err}");
                }
            },
            Config::default(),
        )
        .context("creating filesystem watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("watching {}", root.display()))?;

        info!(root = %root.display(), "change tracker started");

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let collector = tokio::spawn(collect_changes(event_rx, stop_rx, filter));

        Ok(Self {
            root,
            stop_tx: Some(stop_tx),
            collector: Some(collector),
            _watcher: watcher,
        })
    }

    /// Stop watching and return the deduplicated, sorted change set.
    ///
    /// Waits a short drain delay first so events already emitted by the OS
    /// still land in the window. Safe to call when nothing was ever written;
    /// returns an empty set.
    pub async fn stop(mut self) -> ChangeSet {
        tokio::time::sleep(STOP_DRAIN_DELAY).await;

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        let log = match self.collector.take() {
            Some(handle) => match handle.await {
                Ok(log) => log,
                Err(err) => {
                    warn!(error = %err, "change collector task failed; reporting no changes");
                    ChangeLog::new()
                }
            },
            None => ChangeLog::new(),
        };

        let changes = log.finish();
        debug!(
            root = %self.root.display(),
            written = changes.written.len(),
            deleted = changes.deleted.len(),
            "change tracker stopped"
        );
        changes
    }
}

/// Consume notify events until stopped, applying them to a [`ChangeLog`].
async fn collect_changes(
    mut events: mpsc::UnboundedReceiver<Event>,
    mut stop: oneshot::Receiver<()>,
    filter: WatchFilter,
) -> ChangeLog {
    let mut log = ChangeLog::new();
    let mut tick = tokio::time::interval(SETTLE_TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            event = events.recv() => match event {
                Some(event) => apply_event(&mut log, &filter, event),
                // Watcher dropped; no more events can arrive.
                None => break,
            },
            _ = tick.tick() => log.settle(Instant::now()),
        }
    }

    // Drain anything buffered before the stop was observed.
    while let Ok(event) = events.try_recv() {
        apply_event(&mut log, &filter, event);
    }

    log
}

/// Map one notify event onto write/delete observations.
fn apply_event(log: &mut ChangeLog, filter: &WatchFilter, event: Event) {
    for path in &event.paths {
        let Some(rel) = filter.relative(path) else {
            continue;
        };

        match event.kind {
            // Directory lifecycle is not part of the change set.
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {}
            EventKind::Access(_) => {}

            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                debug!(path = %rel, "observed delete");
                log.record_delete(rel);
            }

            EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Metadata(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Other) => {
                if path.is_dir() {
                    continue;
                }
                debug!(path = %rel, "observed write");
                log.record_write(rel, Instant::now());
            }

            // Ambiguous kinds (bare renames, platform quirks): let the
            // current state of the path decide.
            EventKind::Modify(ModifyKind::Name(_)) | EventKind::Any | EventKind::Other => {
                if path.is_dir() {
                    continue;
                }
                if path.exists() {
                    log.record_write(rel, Instant::now());
                } else {
                    log.record_delete(rel);
                }
            }
        }
    }
}
