//! Background scheduler repeatedly invoking a unit of work.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Returned by the unit of work to decide what happens next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Run again after sleeping for the given duration (clamped to the
    /// minimum sleep floor).
    RunAfter(Duration),
    /// Shut the task down; it may be started again later.
    Stop,
}

pub type TaskResult = anyhow::Result<TaskOutcome>;

type Work = dyn Fn() -> BoxFuture<'static, TaskResult> + Send + Sync;

pub const DEFAULT_MINIMUM_SLEEP: Duration = Duration::from_secs(30);
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(60);

struct TaskInner {
    name: String,
    minimum_sleep: Duration,
    error_backoff: Duration,
    work: Box<Work>,
    started: AtomicBool,
    stopping: AtomicBool,
    stop_notify: Notify,
}

/// Periodically invokes a unit of work on a dedicated background task.
///
/// The work itself decides the delay until its next invocation by returning
/// [`TaskOutcome::RunAfter`]; requested delays below the minimum sleep floor
/// are clamped up with a warning. An error from the work unit is logged and
/// retried after a fixed backoff instead of terminating the task.
///
/// `start`/`stop` are safe to call from any thread. `stop` interrupts the
/// current sleep so shutdown is prompt; calling `start` again before the
/// shutdown has completed is a no-op to avoid double execution.
#[derive(Clone)]
pub struct PeriodicTask {
    inner: Arc<TaskInner>,
}

impl PeriodicTask {
    pub fn new<F, Fut>(name: impl Into<String>, work: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self::with_intervals(name, DEFAULT_MINIMUM_SLEEP, DEFAULT_ERROR_BACKOFF, work)
    }

    pub fn with_intervals<F, Fut>(
        name: impl Into<String>,
        minimum_sleep: Duration,
        error_backoff: Duration,
        work: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            inner: Arc::new(TaskInner {
                name: name.into(),
                minimum_sleep,
                error_backoff,
                work: Box::new(move || work().boxed()),
                started: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                stop_notify: Notify::new(),
            }),
        }
    }

    /// Spawns the background task; no-op if it is already running.
    pub fn start(&self) {
        if self.inner.stopping.load(Ordering::SeqCst) {
            warn!(
                task = %self.inner.name,
                "previous task is still shutting down, cannot start again before completed"
            );
            return;
        }

        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!(task = %self.inner.name, "task has already been started");
            return;
        }

        debug!(task = %self.inner.name, "starting background task");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run().await;
        });
    }

    /// Requests cooperative shutdown; in-flight work is allowed to complete,
    /// only future scheduling stops.
    pub fn stop(&self) {
        if !self.inner.started.load(Ordering::SeqCst) {
            debug!(task = %self.inner.name, "not started");
            return;
        }
        if self.inner.stopping.swap(true, Ordering::SeqCst) {
            debug!(task = %self.inner.name, "already stopping");
            return;
        }

        debug!(task = %self.inner.name, "stopping background task");
        self.inner.stop_notify.notify_one();
    }

    /// True iff started and not in the process of shutting down.
    pub fn is_alive(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst) && !self.inner.stopping.load(Ordering::SeqCst)
    }
}

impl TaskInner {
    async fn run(&self) {
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            let sleep_duration = match (self.work)().await {
                Ok(TaskOutcome::Stop) => break,
                Ok(TaskOutcome::RunAfter(requested)) => {
                    if requested < self.minimum_sleep {
                        warn!(
                            task = %self.name,
                            requested = ?requested,
                            minimum = ?self.minimum_sleep,
                            "requested sleep duration is too small, limiting to minimum"
                        );
                        self.minimum_sleep
                    } else {
                        debug!(task = %self.name, duration = ?requested, "sleeping");
                        requested
                    }
                }
                Err(err) => {
                    warn!(
                        task = %self.name,
                        error = %err,
                        backoff = ?self.error_backoff,
                        "periodic work failed, retrying after backoff"
                    );
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {}
                _ = self.stop_notify.notified() => {}
            }
        }

        // a stop() issued while work was in flight may have left an
        // unconsumed permit that would cut the first sleep after a restart
        // short
        self.stop_notify.notified().now_or_never();

        // reset so the task can be started again once fully shut down
        self.started.store(false, Ordering::SeqCst);
        self.stopping.store(false, Ordering::SeqCst);
    }
}
