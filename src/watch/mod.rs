// src/watch/mod.rs

//! File watching and change correlation.
//!
//! This module is responsible for:
//! - Watching one directory recursively for the duration of one execution
//!   window (`notify`, one tracker per task).
//! - Deduplicating raw events into a stable change set: chunked writes count
//!   once, creates and modifies coalesce, deletes dominate.
//! - Normalizing paths (forward-slash, relative to the root) and dropping
//!   structural noise (VCS metadata, caches, build output, the record
//!   storage directory, OS artifacts).
//!
//! It does **not** know about tasks or records; it only turns filesystem
//! events into a [`ChangeSet`] for whoever owns the window.

pub mod changelog;
pub mod filter;
pub mod tracker;

pub use changelog::{ChangeLog, ChangeSet, WRITE_SETTLE};
pub use filter::{relative_str, WatchFilter};
pub use tracker::ChangeTracker;
