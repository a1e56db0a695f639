mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tempfile::tempdir;
use tokio::sync::{mpsc, oneshot, Semaphore};

use taskforge::errors::Result as ForgeResult;
use taskforge::engine::Scheduler;
use taskforge::exec::{BackendInvocation, CommandBackend, OutputChunk, ProcessExit};
use taskforge::store;
use taskforge::types::TaskStatus;
use taskforge_test_utils::builders::{test_scheduler_config, SubmitRequestBuilder};
use taskforge_test_utils::sink::CollectingSink;

type TestResult = Result<(), Box<dyn Error>>;

/// Fake backend that behaves like a process with a signal handler: it stays
/// alive until either the test releases it (natural exit, code 0) or a
/// cancellation request arrives, in which case it "dies" with code 137 a
/// moment later, after the advisory status flip has already been observed.
struct SignalAwareBackend {
    started: Arc<Mutex<usize>>,
    release: Arc<Semaphore>,
}

impl SignalAwareBackend {
    fn new() -> Self {
        Self {
            started: Arc::new(Mutex::new(0)),
            release: Arc::new(Semaphore::new(0)),
        }
    }
}

impl CommandBackend for SignalAwareBackend {
    fn run(
        &self,
        _invocation: BackendInvocation,
        _chunks: mpsc::Sender<OutputChunk>,
        cancel: oneshot::Receiver<()>,
    ) -> Pin<Box<dyn Future<Output = ForgeResult<ProcessExit>> + Send + '_>> {
        let started = Arc::clone(&self.started);
        let release = Arc::clone(&self.release);

        Box::pin(async move {
            *started.lock().unwrap() += 1;

            tokio::select! {
                permit = release.acquire() => {
                    permit.expect("release semaphore closed").forget();
                    Ok(ProcessExit { code: 0 })
                }
                _ = cancel => {
                    // Simulate the gap between SIGTERM and actual death.
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    Ok(ProcessExit { code: 137 })
                }
            }
        })
    }
}

/// Cancelling a running task flips its visible status immediately, while
/// the authoritative terminal transition waits for the exit: exactly one
/// record, one terminal event, and one counter decrement.
#[tokio::test]
async fn cancel_produces_single_record_and_single_decrement() -> TestResult {
    init_tracing();

    let project = tempdir()?;

    let backend = SignalAwareBackend::new();
    let started = Arc::clone(&backend.started);

    let sink = CollectingSink::new();
    let scheduler = Scheduler::new(test_scheduler_config(1), backend, sink.clone());

    let task_id = scheduler.submit(SubmitRequestBuilder::new(project.path()).build())?;
    common::wait_until("task started", || *started.lock().unwrap() == 1).await;

    assert!(scheduler.cancel(&task_id));

    // Advisory flip is visible before the process has exited.
    let task = scheduler.get(&task_id).expect("task exists");
    assert_eq!(task.status, TaskStatus::Cancelled);

    sink.wait_for_terminal(1).await;

    // Terminal event carries the record; the task ends cancelled.
    let completions = sink.completions_snapshot();
    assert_eq!(completions.len(), 1);
    let (final_task, record) = &completions[0];
    assert_eq!(final_task.status, TaskStatus::Cancelled);
    assert_eq!(record.exit_code, 137);
    assert!(
        !record.errors.is_empty(),
        "cancelled record must carry an error note"
    );

    // Exactly one record was persisted.
    let stored = store::list(project.path())?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].record_id, record.record_id);

    // The counter was decremented exactly once: the slot is free again
    // (max_concurrent = 1), and no phantom decrement went below zero.
    assert_eq!(scheduler.running_count(), 0);
    let second = tempdir()?;
    assert!(scheduler
        .submit(SubmitRequestBuilder::new(second.path()).build())
        .is_ok());
    common::wait_until("second task started", || *started.lock().unwrap() == 2).await;
    assert!(scheduler.cancel(&scheduler.list()[1].id.clone()));
    sink.wait_for_terminal(2).await;

    Ok(())
}

/// Cancel on an unknown or already-terminal task is a no-op returning false.
#[tokio::test]
async fn cancel_is_rejected_for_unknown_and_finished_tasks() -> TestResult {
    init_tracing();

    let project = tempdir()?;

    let backend = SignalAwareBackend::new();
    let release = Arc::clone(&backend.release);
    let started = Arc::clone(&backend.started);

    let sink = CollectingSink::new();
    let scheduler = Scheduler::new(test_scheduler_config(1), backend, sink.clone());

    assert!(!scheduler.cancel("no-such-task"));

    let task_id = scheduler.submit(SubmitRequestBuilder::new(project.path()).build())?;
    common::wait_until("task started", || *started.lock().unwrap() == 1).await;

    release.add_permits(1);
    sink.wait_for_terminal(1).await;

    // Task is terminal now; cancellation no longer applies.
    assert!(!scheduler.cancel(&task_id));
    assert_eq!(
        scheduler.get(&task_id).expect("task exists").status,
        TaskStatus::Completed
    );

    // Still exactly one record.
    assert_eq!(store::list(project.path())?.len(), 1);

    Ok(())
}

/// A second cancel on the same running task is a no-op and cannot cause a
/// duplicate terminal event or record.
#[tokio::test]
async fn double_cancel_does_not_double_finalize() -> TestResult {
    init_tracing();

    let project = tempdir()?;

    let backend = SignalAwareBackend::new();
    let started = Arc::clone(&backend.started);

    let sink = CollectingSink::new();
    let scheduler = Scheduler::new(test_scheduler_config(1), backend, sink.clone());

    let task_id = scheduler.submit(SubmitRequestBuilder::new(project.path()).build())?;
    common::wait_until("task started", || *started.lock().unwrap() == 1).await;

    assert!(scheduler.cancel(&task_id));
    assert!(!scheduler.cancel(&task_id));

    sink.wait_for_terminal(1).await;
    // Give any erroneous duplicate a chance to show up.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert_eq!(sink.terminal_count(), 1);
    assert_eq!(store::list(project.path())?.len(), 1);
    assert_eq!(scheduler.running_count(), 0);

    Ok(())
}
