mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tempfile::tempdir;
use tokio::sync::{mpsc, oneshot, Semaphore};

use taskforge::errors::{Result as ForgeResult, TaskError};
use taskforge::engine::Scheduler;
use taskforge::exec::{BackendInvocation, CommandBackend, OutputChunk, ProcessExit};
use taskforge_test_utils::builders::{test_scheduler_config, SubmitRequestBuilder};
use taskforge_test_utils::sink::CollectingSink;

type TestResult = Result<(), Box<dyn Error>>;

/// A fake backend that holds every "process" open until the test releases
/// it, so admission behaviour can be observed while tasks are running.
/// Releases are semaphore permits, so they are never lost even when the
/// task has not reached its wait point yet.
struct ControllableBackend {
    started: Arc<Mutex<Vec<String>>>,
    release: Arc<Semaphore>,
    exit_code: i32,
}

impl ControllableBackend {
    fn new(exit_code: i32) -> Self {
        Self {
            started: Arc::new(Mutex::new(Vec::new())),
            release: Arc::new(Semaphore::new(0)),
            exit_code,
        }
    }
}

impl CommandBackend for ControllableBackend {
    fn run(
        &self,
        invocation: BackendInvocation,
        _chunks: mpsc::Sender<OutputChunk>,
        _cancel: oneshot::Receiver<()>,
    ) -> Pin<Box<dyn Future<Output = ForgeResult<ProcessExit>> + Send + '_>> {
        let started = Arc::clone(&self.started);
        let release = Arc::clone(&self.release);
        let exit_code = self.exit_code;

        Box::pin(async move {
            started.lock().unwrap().push(invocation.cwd.display().to_string());
            let permit = release.acquire().await.expect("release semaphore closed");
            permit.forget();
            Ok(ProcessExit { code: exit_code })
        })
    }
}

/// With two tasks already running at `max_concurrent = 2`, a third submit
/// is rejected synchronously and creates no task.
#[tokio::test]
async fn third_submit_rejected_at_cap() -> TestResult {
    init_tracing();

    let dir_a = tempdir()?;
    let dir_b = tempdir()?;
    let dir_c = tempdir()?;

    let backend = ControllableBackend::new(0);
    let release = Arc::clone(&backend.release);
    let started = Arc::clone(&backend.started);

    let sink = CollectingSink::new();
    let scheduler = Scheduler::new(test_scheduler_config(2), backend, sink.clone());

    scheduler.submit(SubmitRequestBuilder::new(dir_a.path()).build())?;
    scheduler.submit(SubmitRequestBuilder::new(dir_b.path()).build())?;

    common::wait_until("both tasks started", || started.lock().unwrap().len() == 2).await;
    assert_eq!(scheduler.running_count(), 2);

    let rejected = scheduler.submit(SubmitRequestBuilder::new(dir_c.path()).build());
    assert_eq!(
        rejected.unwrap_err(),
        TaskError::AdmissionRejected { limit: 2 }
    );

    // No task was created for the rejected submission.
    assert_eq!(scheduler.list().len(), 2);
    assert_eq!(scheduler.running_count(), 2);

    // Once a slot frees up, a new submission is admitted again.
    release.add_permits(1);
    sink.wait_for_terminal(1).await;

    let admitted = scheduler.submit(SubmitRequestBuilder::new(dir_c.path()).build());
    assert!(admitted.is_ok());

    release.add_permits(1);
    release.add_permits(1);
    sink.wait_for_terminal(3).await;

    Ok(())
}

/// The number of running tasks never exceeds the cap across a whole
/// sequence of submissions and completions.
#[tokio::test]
async fn running_count_never_exceeds_cap() -> TestResult {
    init_tracing();

    const CAP: usize = 3;

    let backend = ControllableBackend::new(0);
    let release = Arc::clone(&backend.release);

    let sink = CollectingSink::new();
    let scheduler = Scheduler::new(test_scheduler_config(CAP), backend, sink.clone());

    let dirs: Vec<_> = (0..8).map(|_| tempdir().unwrap()).collect();

    let mut admitted = 0;
    for dir in &dirs {
        match scheduler.submit(SubmitRequestBuilder::new(dir.path()).build()) {
            Ok(_) => admitted += 1,
            Err(TaskError::AdmissionRejected { limit }) => assert_eq!(limit, CAP),
            Err(other) => panic!("unexpected submit error: {other}"),
        }
        assert!(scheduler.running_count() <= CAP);
    }
    assert_eq!(admitted, CAP);

    // Drain: release everything, then capacity is back.
    for _ in 0..admitted {
        release.add_permits(1);
    }
    sink.wait_for_terminal(admitted).await;
    assert_eq!(scheduler.running_count(), 0);

    // All slots are reusable after the first wave finalized.
    let extra = tempdir()?;
    assert!(scheduler
        .submit(SubmitRequestBuilder::new(extra.path()).build())
        .is_ok());
    release.add_permits(1);
    sink.wait_for_terminal(admitted + 1).await;

    Ok(())
}

/// Finished tasks can be cleared from the registry; running ones survive.
#[tokio::test]
async fn clear_finished_keeps_running_tasks() -> TestResult {
    init_tracing();

    let backend = ControllableBackend::new(0);
    let release = Arc::clone(&backend.release);

    let sink = CollectingSink::new();
    let scheduler = Scheduler::new(test_scheduler_config(2), backend, sink.clone());

    let dir_a = tempdir()?;
    let dir_b = tempdir()?;
    let id_a = scheduler.submit(SubmitRequestBuilder::new(dir_a.path()).build())?;
    let id_b = scheduler.submit(SubmitRequestBuilder::new(dir_b.path()).build())?;

    release.add_permits(1);
    sink.wait_for_terminal(1).await;

    let removed = scheduler.clear_finished();
    assert_eq!(removed, 1);

    let remaining = scheduler.list();
    assert_eq!(remaining.len(), 1);
    let survivor = &remaining[0].id;
    assert!(survivor == &id_a || survivor == &id_b);

    release.add_permits(1);
    sink.wait_for_terminal(2).await;

    Ok(())
}
