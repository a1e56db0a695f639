use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use taskforge::errors::Result;
use taskforge::events::StreamKind;
use taskforge::exec::{BackendInvocation, CommandBackend, OutputChunk, ProcessExit};

/// A fake backend that:
/// - records every invocation it receives (program, cwd, stdin payload)
/// - emits a scripted sequence of output chunks
/// - optionally writes/deletes files in the invocation's working directory,
///   so change-tracker behaviour can be exercised without a real process
/// - exits with a scripted code.
///
/// File mutations are followed by a short pause before the future resolves,
/// giving the OS watcher time to deliver the events inside the window.
pub struct FakeBackend {
    script: FakeScript,
    pub invocations: Arc<Mutex<Vec<BackendInvocation>>>,
}

/// What one fake run should do.
#[derive(Debug, Clone, Default)]
pub struct FakeScript {
    pub chunks: Vec<(StreamKind, String)>,
    pub exit_code: i32,
    /// Files to create in the cwd: (relative path, contents).
    pub write_files: Vec<(String, String)>,
    /// Files to remove from the cwd (relative paths).
    pub delete_files: Vec<String>,
}

impl FakeScript {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn stdout(mut self, data: &str) -> Self {
        self.chunks.push((StreamKind::Stdout, data.to_string()));
        self
    }

    pub fn stderr(mut self, data: &str) -> Self {
        self.chunks.push((StreamKind::Stderr, data.to_string()));
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn writes(mut self, path: &str, contents: &str) -> Self {
        self.write_files.push((path.to_string(), contents.to_string()));
        self
    }

    pub fn deletes(mut self, path: &str) -> Self {
        self.delete_files.push(path.to_string());
        self
    }
}

impl FakeBackend {
    pub fn new(script: FakeScript) -> Self {
        Self {
            script,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }
}

impl CommandBackend for FakeBackend {
    fn run(
        &self,
        invocation: BackendInvocation,
        chunks: mpsc::Sender<OutputChunk>,
        _cancel: oneshot::Receiver<()>,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessExit>> + Send + '_>> {
        let script = self.script.clone();
        let invocations = Arc::clone(&self.invocations);

        Box::pin(async move {
            let cwd = invocation.cwd.clone();
            {
                let mut guard = invocations.lock().unwrap();
                guard.push(invocation);
            }

            for (kind, data) in script.chunks {
                let _ = chunks.send(OutputChunk { kind, data }).await;
            }

            let mutated = !script.write_files.is_empty() || !script.delete_files.is_empty();
            for (path, contents) in &script.write_files {
                let target = cwd.join(path);
                if let Some(parent) = target.parent() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }
                tokio::fs::write(&target, contents)
                    .await
                    .map_err(anyhow::Error::from)?;
            }
            for path in &script.delete_files {
                tokio::fs::remove_file(cwd.join(path))
                    .await
                    .map_err(anyhow::Error::from)?;
            }

            if mutated {
                // Let the watcher observe the mutations inside the window.
                tokio::time::sleep(Duration::from_millis(200)).await;
            }

            Ok(ProcessExit {
                code: script.exit_code,
            })
        })
    }
}
