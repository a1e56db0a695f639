mod common;
use crate::common::init_tracing;

use taskforge::engine::{FinalOutcome, TaskRegistry};
use taskforge::errors::TaskError;
use taskforge::types::TaskStatus;
use taskforge_test_utils::builders::SubmitRequestBuilder;

fn request() -> taskforge::types::SubmitRequest {
    SubmitRequestBuilder::new(std::path::Path::new("/tmp/project")).build()
}

fn ts(n: u64) -> String {
    format!("2026-08-07T10:00:{:02}.000Z", n)
}

#[test]
fn admission_respects_cap_and_counter() {
    init_tracing();

    let mut registry = TaskRegistry::new(2);

    let a = registry.admit(&request(), "a".into(), ts(0)).unwrap();
    let b = registry.admit(&request(), "b".into(), ts(1)).unwrap();
    assert_eq!(a.status, TaskStatus::Running);
    assert_eq!(b.status, TaskStatus::Running);
    assert_eq!(registry.running_count(), 2);

    let rejected = registry.admit(&request(), "c".into(), ts(2));
    assert_eq!(
        rejected.unwrap_err(),
        TaskError::AdmissionRejected { limit: 2 }
    );
    assert_eq!(registry.list().len(), 2, "rejected submit creates no task");

    // A finalization frees the slot.
    registry.finalize(
        "a",
        FinalOutcome::Completed {
            record_id: "r-a".into(),
        },
        ts(3),
    );
    assert_eq!(registry.running_count(), 1);
    assert!(registry.admit(&request(), "c".into(), ts(4)).is_ok());
}

#[test]
fn finalize_is_idempotent() {
    init_tracing();

    let mut registry = TaskRegistry::new(1);
    registry.admit(&request(), "t".into(), ts(0)).unwrap();

    let first = registry.finalize(
        "t",
        FinalOutcome::Completed {
            record_id: "r-1".into(),
        },
        ts(1),
    );
    assert!(first.is_some());
    assert_eq!(registry.running_count(), 0);

    // Second finalization (e.g. a racing path) is a no-op: no double
    // decrement, no status overwrite.
    let second = registry.finalize(
        "t",
        FinalOutcome::Failed {
            error: TaskError::NonZeroExit { code: 1 },
            record_id: None,
        },
        ts(2),
    );
    assert!(second.is_none());
    assert_eq!(registry.running_count(), 0);

    let task = registry.get("t").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.record_id.as_deref(), Some("r-1"));
}

#[test]
fn cancel_flip_is_advisory() {
    init_tracing();

    let mut registry = TaskRegistry::new(1);
    registry.admit(&request(), "t".into(), ts(0)).unwrap();

    assert!(registry.mark_cancel_requested("t"));
    // Visible immediately, but the slot is still held.
    assert_eq!(registry.get("t").unwrap().status, TaskStatus::Cancelled);
    assert!(registry.cancel_requested("t"));
    assert_eq!(registry.running_count(), 1);

    // Repeat cancels and cancels on unknown tasks are no-ops.
    assert!(!registry.mark_cancel_requested("t"));
    assert!(!registry.mark_cancel_requested("missing"));

    // The exit path later applies the authoritative transition.
    let task = registry
        .finalize(
            "t",
            FinalOutcome::Cancelled {
                record_id: "r-c".into(),
            },
            ts(1),
        )
        .unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.record_id.as_deref(), Some("r-c"));
    assert_eq!(registry.running_count(), 0);

    // After finalization, cancel is rejected.
    assert!(!registry.mark_cancel_requested("t"));
}

#[test]
fn output_accumulates_in_order() {
    init_tracing();

    let mut registry = TaskRegistry::new(1);
    registry.admit(&request(), "t".into(), ts(0)).unwrap();

    registry.append_output("t", "partial li");
    registry.append_output("t", "ne\nsecond line\n");
    registry.append_output("missing", "dropped");

    assert_eq!(registry.get("t").unwrap().output, "partial line\nsecond line\n");
}

#[test]
fn list_sorts_by_start_time() {
    init_tracing();

    let mut registry = TaskRegistry::new(3);
    registry.admit(&request(), "b".into(), ts(5)).unwrap();
    registry.admit(&request(), "a".into(), ts(1)).unwrap();
    registry.admit(&request(), "c".into(), ts(9)).unwrap();

    let ids: Vec<String> = registry.list().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
}

#[test]
fn failed_outcome_records_error_detail() {
    init_tracing();

    let mut registry = TaskRegistry::new(1);
    registry.admit(&request(), "t".into(), ts(0)).unwrap();

    let task = registry
        .finalize(
            "t",
            FinalOutcome::Failed {
                error: TaskError::SpawnFailure {
                    program: "claude".into(),
                    message: "No such file or directory".into(),
                },
                record_id: None,
            },
            ts(1),
        )
        .unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("claude"));
    assert!(task.record_id.is_none());
    assert!(task.end_time.is_some());
}
