// src/watch/filter.rs

//! Path filtering for the change tracker.
//!
//! Two concerns live here:
//! - normalizing absolute event paths into forward-slash paths relative to
//!   the watched root (robust against symlinked roots, notably macOS
//!   `/private/var` tempdirs);
//! - dropping structural noise: VCS metadata, dependency caches, build
//!   output, the record storage directory itself, and OS artifact files.
//!   The exclusion list is fixed, not user-configurable; the point is a
//!   high signal-to-noise change set for AI-driven edits.

use std::path::{Path, PathBuf};

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::Result;

/// Directories and files never reported as changes.
const EXCLUDED_PATTERNS: &[&str] = &[
    "**/.git/**",
    "**/.hg/**",
    "**/.svn/**",
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/.taskforge/**",
    "**/*.log",
    "**/.DS_Store",
    "**/Thumbs.db",
];

/// Compiled exclusion set plus the root paths are relativized against.
#[derive(Debug)]
pub struct WatchFilter {
    root: PathBuf,
    excluded: GlobSet,
}

impl WatchFilter {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in EXCLUDED_PATTERNS {
            builder.add(
                Glob::new(pattern)
                    .with_context(|| format!("compiling exclusion pattern {pattern}"))?,
            );
        }
        let excluded = builder.build().context("building exclusion glob set")?;

        Ok(Self {
            root: root.into(),
            excluded,
        })
    }

    /// Normalize an absolute event path.
    ///
    /// Returns the forward-slash path relative to the root, or `None` when
    /// the path falls outside the root or matches an exclusion.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = relative_str(&self.root, path)?;
        if self.excluded.is_match(Path::new(&rel)) {
            return None;
        }
        Some(rel)
    }
}

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// This is intentionally robust:
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again. The event path may no longer
///   exist (deletes), so its parent is canonicalized instead when needed.
/// - Only if all attempts fail do we give up.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    // Fast path: event path already starts with our root.
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    // Deleted paths cannot be canonicalized; resolve through the parent.
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if let (Ok(root_canon), Ok(parent_canon)) = (root.canonicalize(), parent.canonicalize()) {
            if let Ok(rel) = parent_canon.join(name).strip_prefix(&root_canon) {
                return Some(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    None
}
