//! Bounded background execution for blocking database work.
//!
//! Every submission returns a [`Pending`] handle. Awaiting it yields the
//! task's result; dropping it leaves the task running and logs a failure
//! instead of returning it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use anyhow::{Context, Result, anyhow};
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_POOL_SIZE: usize = 4;

/// At most `size` jobs run at once; the rest wait for a free permit.
///
/// Jobs submitted separately run in no particular order.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    runtime: Handle,
    size: usize,
}

impl WorkerPool {
    /// Must be called from within a tokio runtime.
    pub fn new(size: usize) -> Result<Self> {
        anyhow::ensure!(size >= 1, "worker pool size must be at least 1 (got {size})");
        let runtime = Handle::try_current().context("Worker pool requires a tokio runtime")?;
        Ok(WorkerPool {
            permits: Arc::new(Semaphore::new(size)),
            runtime,
            size,
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `fut` on the pool's runtime. Works from threads outside it.
    pub(crate) fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(fut)
    }

    pub fn submit<T, F>(&self, label: &'static str, work: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let permits = Arc::clone(&self.permits);
        debug!(task = label, "submitted");
        self.runtime.spawn(async move {
            let result = run(label, &permits, work).await;
            if let Err(Err(e)) = tx.send(result) {
                warn!(task = label, error = %format!("{e:#}"), "background task failed");
            }
        });
        Pending { label, rx }
    }
}

async fn run<T, F>(label: &'static str, permits: &Semaphore, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let _permit = permits
        .acquire()
        .await
        .context("Worker pool has been shut down")?;
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| anyhow!("{label} task did not complete: {e}"))?
        .with_context(|| format!("{label} failed"))
}

/// Result of a job submitted to a [`WorkerPool`].
#[must_use = "drop the Pending to run the job in the background, or await it for the result"]
pub struct Pending<T> {
    label: &'static str,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// Wait for the job. Same as `.await`.
    pub async fn wait(self) -> Result<T> {
        self.await
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let label = self.label;
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received
                .map_err(|_| anyhow!("{label} was dropped before it finished"))
                .and_then(|result| result)
        })
    }
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        // The job may already have finished without anyone reading the result.
        if let Ok(Err(e)) = self.rx.try_recv() {
            warn!(task = self.label, error = %format!("{e:#}"), "background task failed");
        }
    }
}
