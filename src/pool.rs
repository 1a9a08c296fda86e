//! Bounded worker pool for media jobs.
//!
//! Submission is non-blocking and FIFO: a fair semaphore admits up to the
//! configured worker count, everything else waits its turn. The pool tracks
//! queued and active jobs separately so shutdown can drop unstarted work
//! without touching running processes, and cancel stragglers only after the
//! grace period.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vidmill_av::{Error, ExecutionResult, OperationRequest, Result};

/// Runs one job to completion. Implemented by the real job processor and by
/// instrumented fakes in tests.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    /// Run the request, observing the token at every blocking point.
    async fn run(
        &self,
        request: &OperationRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult>;
}

/// A job accepted by the pool.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub request: OperationRequest,
    pub submitted_at: DateTime<Utc>,
}

/// Handle to an accepted job. Await [`JobHandle::wait`] for the result, or
/// cancel it at any point before or during execution.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    cancel: CancellationToken,
    rx: oneshot::Receiver<Result<ExecutionResult>>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancel the job. A queued job leaves the queue without side effects; a
    /// running job goes through terminate-then-kill.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job's result. Errors from the underlying job propagate
    /// unchanged.
    pub async fn wait(self) -> Result<ExecutionResult> {
        match self.rx.await {
            Ok(result) => result,
            // The pool task was torn down before reporting (runtime shutdown).
            Err(_) => Ok(ExecutionResult::cancelled_before_start()),
        }
    }
}

struct PoolInner {
    runner: Arc<dyn JobRunner>,
    semaphore: Arc<Semaphore>,
    accepting: AtomicBool,
    queued: Mutex<HashMap<Uuid, CancellationToken>>,
    active: Mutex<HashMap<Uuid, CancellationToken>>,
    drained: Notify,
    root: CancellationToken,
}

impl PoolInner {
    fn is_idle(&self) -> bool {
        self.queued.lock().is_empty() && self.active.lock().is_empty()
    }
}

/// Fixed-capacity pool of concurrent job slots.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create a pool running at most `workers` jobs at once.
    pub fn new(runner: Arc<dyn JobRunner>, workers: usize) -> Self {
        let workers = workers.clamp(1, 20);
        Self {
            inner: Arc::new(PoolInner {
                runner,
                semaphore: Arc::new(Semaphore::new(workers)),
                accepting: AtomicBool::new(true),
                queued: Mutex::new(HashMap::new()),
                active: Mutex::new(HashMap::new()),
                drained: Notify::new(),
                root: CancellationToken::new(),
            }),
        }
    }

    /// Submit a job. Returns immediately with a handle; the process spawn is
    /// deferred until a slot frees up.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ShuttingDown`] once shutdown has begun.
    pub fn submit(&self, request: OperationRequest) -> Result<JobHandle> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let job = Job {
            id: Uuid::new_v4(),
            request,
            submitted_at: Utc::now(),
        };
        let job_id = job.id;
        let token = self.inner.root.child_token();
        let (tx, rx) = oneshot::channel();

        self.inner.queued.lock().insert(job_id, token.clone());
        tracing::debug!("queued job {job_id} ({})", job.request.operation.kind());

        let inner = Arc::clone(&self.inner);
        let task_token = token.clone();
        tokio::spawn(async move {
            let outcome = Self::run_job(&inner, job, task_token).await;
            inner.drained.notify_waiters();
            let _ = tx.send(outcome);
        });

        Ok(JobHandle {
            id: job_id,
            cancel: token,
            rx,
        })
    }

    async fn run_job(
        inner: &Arc<PoolInner>,
        job: Job,
        token: CancellationToken,
    ) -> Result<ExecutionResult> {
        // Queued phase: wait for a slot unless cancelled first. The fair
        // semaphore preserves FIFO admission order.
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = inner.semaphore.clone().acquire_owned() => permit.ok(),
        };

        let Some(permit) = permit else {
            inner.queued.lock().remove(&job.id);
            tracing::debug!("job {} cancelled before start", job.id);
            return Ok(ExecutionResult::cancelled_before_start());
        };

        inner.queued.lock().remove(&job.id);
        inner.active.lock().insert(job.id, token.clone());
        tracing::debug!("job {} started", job.id);

        let result = inner.runner.run(&job.request, &token).await;

        inner.active.lock().remove(&job.id);
        drop(permit);

        match &result {
            Ok(r) => tracing::debug!("job {} finished: {:?}", job.id, r.outcome),
            Err(e) => tracing::debug!("job {} errored: {e}", job.id),
        }
        result
    }

    /// Number of jobs currently executing.
    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Number of jobs waiting for a slot.
    pub fn queued_count(&self) -> usize {
        self.inner.queued.lock().len()
    }

    /// Stop accepting submissions and drain.
    ///
    /// With `immediate`, queued-but-unstarted jobs are cancelled right away;
    /// otherwise they drain as slots free up. Active jobs get up to `grace`
    /// to finish naturally, after which everything still running is
    /// cancelled (terminate-then-kill at the process level) and the pool
    /// waits for the executors to reap their children.
    pub async fn shutdown(&self, grace: Duration, immediate: bool) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        tracing::info!(
            "pool shutting down (grace {:?}, immediate: {immediate})",
            grace
        );

        if immediate {
            let queued: Vec<CancellationToken> =
                self.inner.queued.lock().values().cloned().collect();
            for token in queued {
                token.cancel();
            }
        }

        if tokio::time::timeout(grace, self.wait_idle()).await.is_err() {
            tracing::warn!("grace period elapsed; cancelling remaining jobs");
            self.inner.root.cancel();
            self.wait_idle().await;
        }

        tracing::info!("pool drained");
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register for the next notification before checking, so a job
            // finishing between the check and the await cannot be missed.
            notified.as_mut().enable();
            if self.inner.is_idle() {
                return;
            }
            notified.await;
        }
    }
}
