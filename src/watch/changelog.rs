// src/watch/changelog.rs

//! Pure change-set accumulation for one execution window.
//!
//! [`ChangeLog`] is a synchronous, deterministic state machine: the tracker
//! feeds it write/delete observations with explicit `Instant`s and it
//! produces the final [`ChangeSet`]. No channels, no Tokio, no filesystem;
//! it is intended to be extensively unit tested without any IO.
//!
//! Semantics:
//! - a write is *pending* until no further write hits the same path for the
//!   stability window (chunked writes to one file count once, and we never
//!   look at a half-written file's metadata);
//! - a delete removes the path from both pending and settled writes; a path
//!   created and deleted inside the window ends up only in `deleted`;
//! - a write after a delete moves the path back to `written` (last event
//!   wins; the file exists at window end);
//! - `finish` flushes whatever is still pending: the window is over and the
//!   writing process has exited, so the writes are complete.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// How long a path must stay quiet before a write is considered complete.
pub const WRITE_SETTLE: Duration = Duration::from_millis(100);

/// Deduplicated filesystem mutations observed during one execution window.
///
/// Paths are forward-slash, relative to the watched root, and each list is
/// lexicographically sorted. A path appears in at most one of the two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub written: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.deleted.is_empty()
    }
}

/// Accumulates raw write/delete observations into a [`ChangeSet`].
#[derive(Debug, Default)]
pub struct ChangeLog {
    /// Writes whose stability window has elapsed.
    written: BTreeSet<String>,
    /// Paths removed during the window.
    deleted: BTreeSet<String>,
    /// Writes still inside the stability window, keyed by last write time.
    pending: HashMap<String, Instant>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a create or modify event on `path`.
    pub fn record_write(&mut self, path: String, at: Instant) {
        self.deleted.remove(&path);
        self.pending.insert(path, at);
    }

    /// Observe a delete event on `path`.
    pub fn record_delete(&mut self, path: String) {
        self.pending.remove(&path);
        self.written.remove(&path);
        self.deleted.insert(path);
    }

    /// Move pending writes whose stability window has elapsed into the
    /// settled set.
    pub fn settle(&mut self, now: Instant) {
        let mut ready = Vec::new();
        for (path, last) in &self.pending {
            if now.duration_since(*last) >= WRITE_SETTLE {
                ready.push(path.clone());
            }
        }
        for path in ready {
            self.pending.remove(&path);
            self.written.insert(path);
        }
    }

    /// Close the window and return the final, sorted change set.
    ///
    /// Remaining pending writes are flushed as written: the process whose
    /// window this was has exited, so no further chunks are coming.
    pub fn finish(mut self) -> ChangeSet {
        for (path, _) in self.pending.drain() {
            self.written.insert(path);
        }
        ChangeSet {
            written: self.written.into_iter().collect(),
            deleted: self.deleted.into_iter().collect(),
        }
    }

    /// Number of distinct paths currently tracked (for logging).
    pub fn len(&self) -> usize {
        self.written.len() + self.deleted.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
