use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskforge::errors::TaskError;
use taskforge::events::{EventSink, StreamChunk};
use taskforge::store::ExecutionRecord;
use taskforge::types::Task;

/// An `EventSink` that collects everything in memory for assertions.
#[derive(Default)]
pub struct CollectingSink {
    pub chunks: Mutex<Vec<StreamChunk>>,
    pub completions: Mutex<Vec<(Task, ExecutionRecord)>>,
    pub errors: Mutex<Vec<(Task, TaskError)>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of terminal events observed so far.
    pub fn terminal_count(&self) -> usize {
        self.completions.lock().unwrap().len() + self.errors.lock().unwrap().len()
    }

    /// Poll until `n` terminal events have been observed (5s budget).
    pub async fn wait_for_terminal(&self, n: usize) {
        for _ in 0..500 {
            if self.terminal_count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} terminal event(s), saw {} within the timeout",
            n,
            self.terminal_count()
        );
    }

    pub fn completions_snapshot(&self) -> Vec<(Task, ExecutionRecord)> {
        self.completions.lock().unwrap().clone()
    }

    pub fn errors_snapshot(&self) -> Vec<(Task, TaskError)> {
        self.errors.lock().unwrap().clone()
    }

    pub fn chunks_snapshot(&self) -> Vec<StreamChunk> {
        self.chunks.lock().unwrap().clone()
    }
}

impl EventSink for CollectingSink {
    fn on_chunk(&self, chunk: StreamChunk) {
        self.chunks.lock().unwrap().push(chunk);
    }

    fn on_complete(&self, task: Task, record: ExecutionRecord) {
        self.completions.lock().unwrap().push((task, record));
    }

    fn on_error(&self, task: Task, error: TaskError) {
        self.errors.lock().unwrap().push((task, error));
    }
}
