use localnote_core::{NotifyError, Result};
use once_cell::sync::OnceCell;
use serde_json::Value;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{error, trace, warn};

use crate::host::Reply;

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// The lane always runs on its own process-wide runtime. A caller's runtime
/// may shut down while commands are still arriving.
fn runtime_handle(threads: usize) -> Result<Handle> {
    RUNTIME
        .get_or_try_init(|| {
            Builder::new_multi_thread()
                .worker_threads(threads.max(1))
                .thread_name("localnote-worker")
                .build()
        })
        .map(|runtime| runtime.handle().clone())
        .map_err(|err| NotifyError::internal(format!("failed to start worker runtime: {err}")))
}

/// Asynchronous command lane. Jobs run on the blocking pool of a shared tokio
/// runtime so the calling thread never waits on them.
#[derive(Debug, Clone)]
pub struct WorkerLane {
    handle: Handle,
}

impl WorkerLane {
    pub fn new(threads: usize) -> Result<Self> {
        Ok(Self {
            handle: runtime_handle(threads)?,
        })
    }

    /// Run `job` off the calling thread and answer `reply` with its outcome.
    /// Errors and panics inside the job become failure replies.
    pub fn run<F>(&self, label: &'static str, job: F, reply: Reply)
    where
        F: FnOnce() -> Result<Option<Value>> + Send + 'static,
    {
        trace!(command = label, "worker.spawn_blocking");
        let reply = reply.labelled(label);
        self.handle.spawn(async move {
            match tokio::task::spawn_blocking(job).await {
                Ok(Ok(value)) => reply.respond(value),
                Ok(Err(err)) => {
                    warn!(command = label, %err, "command failed");
                    reply.error(err.to_string());
                }
                Err(join_err) => {
                    error!(command = label, %join_err, "worker task aborted");
                    reply.error(format!("{label}: worker task aborted: {join_err}"));
                }
            }
        });
    }

    /// Fire-and-forget work whose failure is only logged.
    pub fn spawn_detached<F>(&self, label: &'static str, job: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        trace!(task = label, "worker.spawn_detached");
        self.handle.spawn_blocking(move || {
            if let Err(err) = job() {
                error!(task = label, %err, "background task failed");
            }
        });
    }
}
