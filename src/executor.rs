//! Where background materialization reloads run.

use std::sync::Arc;

use tracing::{error, warn};

use crate::config::ExecutorKind;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait TaskExecutor: Send + Sync {
    fn submit(&self, task: Task);
}

/// Runs the task before `submit` returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct SameThreadExecutor;

impl TaskExecutor for SameThreadExecutor {
    fn submit(&self, task: Task) { task() }
}

/// Spawns one named OS thread per task.
#[derive(Debug, Clone)]
pub struct ThreadExecutor {
    name: String,
}

impl ThreadExecutor {
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into() } }
}

impl Default for ThreadExecutor {
    fn default() -> Self { Self::new("tempdata-matload") }
}

impl TaskExecutor for ThreadExecutor {
    fn submit(&self, task: Task) {
        if let Err(e) = std::thread::Builder::new().name(self.name.clone()).spawn(task) {
            error!(target: "clarium::matviews", "failed to spawn '{}' thread: {}", self.name, e);
        }
    }
}

/// Hands tasks to a tokio runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self { Self { handle } }

    /// Bind to the runtime the caller is running on, if any.
    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl TaskExecutor for TokioExecutor {
    fn submit(&self, task: Task) {
        // join handle dropped: the task is detached
        let _ = self.handle.spawn_blocking(task);
    }
}

/// Build the executor named by configuration. `Tokio` outside a runtime
/// degrades to a thread executor.
pub fn from_kind(kind: ExecutorKind) -> Arc<dyn TaskExecutor> {
    match kind {
        ExecutorKind::Sync => Arc::new(SameThreadExecutor),
        ExecutorKind::Thread => Arc::new(ThreadExecutor::default()),
        ExecutorKind::Tokio => match TokioExecutor::try_current() {
            Some(t) => Arc::new(t),
            None => {
                warn!(target: "clarium::matviews", "no tokio runtime available; using thread executor");
                Arc::new(ThreadExecutor::default())
            }
        },
    }
}
