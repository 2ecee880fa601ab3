//! One-shot job timer
//!
//! Streams defer work (the next due frame, the end of a bounded live item)
//! through a [`Timer`]. Jobs are identified by name so they can be
//! cancelled; cancellation is a request, a job that has already started
//! running is not waited for.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A deferred callback
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Name of a scheduled job
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Schedules one-shot jobs
pub trait Timer: Send + Sync {
    /// Run `job` once after `delay`
    fn schedule_once(&self, delay: Duration, job: Job) -> JobHandle;

    /// Cancel a job that has not started yet
    fn cancel(&self, handle: &JobHandle);
}

/// Timer running each job on its own tokio task
pub struct TokioTimer {
    handle: Handle,
    jobs: Arc<Mutex<HashMap<JobHandle, JoinHandle<()>>>>,
    next_id: AtomicU64,
}

impl TokioTimer {
    /// Create a timer spawning onto `handle`
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a timer on the current runtime
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Number of jobs scheduled but not yet finished
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }
}

impl Timer for TokioTimer {
    fn schedule_once(&self, delay: Duration, job: Job) -> JobHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = JobHandle::new(format!("ScheduledOnceJob_{}", id));

        let jobs = Arc::clone(&self.jobs);
        let task_name = name.clone();
        // hold the map lock until the task is registered so a zero delay
        // job cannot finish (and deregister) before it was inserted
        let mut guard = self.jobs.lock();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            jobs.lock().remove(&task_name);
            job();
        });
        guard.insert(name.clone(), task);

        tracing::trace!(job = %name, delay_ms = delay.as_millis() as u64, "Job scheduled");
        name
    }

    fn cancel(&self, handle: &JobHandle) {
        if let Some(task) = self.jobs.lock().remove(handle) {
            task.abort();
            tracing::trace!(job = %handle, "Job cancelled");
        }
    }
}

impl fmt::Debug for TokioTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioTimer")
            .field("pending", &self.pending())
            .finish()
    }
}
