// src/store/mod.rs

//! Immutable execution-record storage.
//!
//! Every terminated task (success, failure, cancellation, but not spawn
//! failure) produces exactly one [`ExecutionRecord`], persisted as one
//! pretty-printed JSON file under `.taskforge/records/` in the project root.
//!
//! The store is append-only: the core never rewrites a record file, only
//! the explicit delete operations remove them. Listing re-reads the
//! directory on every call, so external deletion or addition is tolerated
//! and reflected on the next read; corrupt files are logged and skipped,
//! never fatal.

pub mod record;
pub mod store;

pub use record::{build_record, ExecutionRecord, RecordDraft};
pub use store::{
    delete, delete_all, get, list, next_record_id, persist, record_path, records_dir,
    RECORDS_DIR,
};
