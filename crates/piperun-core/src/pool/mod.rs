//! Bounded worker pool with admission and completion deadlines.
//!
//! A [`Pool`] runs a fixed number of workers that take jobs from one shared
//! FIFO queue. Each worker slot is a semaphore permit: a submission must
//! acquire one within the admission timeout or it is rejected without
//! running, and the permit is held until the worker has fully finished the
//! job (including reaping a killed command).

mod job;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::execute::Executor;

pub use job::{JobHandle, JobResult};

use job::{Job, QueuedJob};

/// Handle to a worker pool. Clones share the same workers.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    /// Settings used at start. Locked across start so `set_config` cannot race it.
    config: Mutex<PoolConfig>,
    running: OnceLock<Running>,
    closed: AtomicBool,
    next_job_id: AtomicU64,
    spawned_workers: AtomicUsize,
}

/// State that exists once the workers are up.
struct Running {
    config: PoolConfig,
    runtime: Handle,
    /// Taken on shutdown; the queue closes once in-flight admissions finish.
    queue: Mutex<Option<mpsc::UnboundedSender<QueuedJob>>>,
    slots: Arc<Semaphore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::with_valid_config(PoolConfig::default())
    }
}

impl Pool {
    /// Create a pool. Workers are not started until [`Pool::start`] or the
    /// first [`Pool::submit`].
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config: Mutex::new(config),
                running: OnceLock::new(),
                closed: AtomicBool::new(false),
                next_job_id: AtomicU64::new(1),
                spawned_workers: AtomicUsize::new(0),
            }),
        }
    }

    /// Replace the configuration. Only allowed before the pool has started.
    pub fn set_config(&self, config: PoolConfig) -> Result<()> {
        config.validate()?;

        let mut current = lock(&self.inner.config);
        if self.inner.running.get().is_some() {
            return Err(Error::AlreadyStarted);
        }
        *current = config;
        Ok(())
    }

    /// Current configuration.
    pub fn config(&self) -> PoolConfig {
        match self.inner.running.get() {
            Some(running) => running.config.clone(),
            None => lock(&self.inner.config).clone(),
        }
    }

    /// Start the workers.
    ///
    /// Safe to call any number of times from any number of threads; exactly
    /// one set of workers is created. The first successful call must come
    /// from within a tokio runtime, which then hosts the workers.
    pub fn start(&self) -> Result<()> {
        self.running().map(|_| ())
    }

    pub fn is_started(&self) -> bool {
        self.inner.running.get().is_some()
    }

    /// Number of workers this pool has ever spawned.
    pub fn spawned_workers(&self) -> usize {
        self.inner.spawned_workers.load(Ordering::SeqCst)
    }

    /// Number of worker slots currently held by admitted jobs.
    pub fn busy_workers(&self) -> usize {
        self.inner
            .running
            .get()
            .map(|running| running.config.workers - running.slots.available_permits())
            .unwrap_or(0)
    }

    /// Submit `command` with `input` on its stdin.
    ///
    /// Returns immediately. The handle yields exactly one result: the
    /// command's stdout, or the error that stopped it, including
    /// [`Error::AdmissionTimeout`] when no worker became free in time and
    /// [`Error::CompletionTimeout`] when the command ran too long.
    pub fn submit(&self, command: impl Into<String>, input: impl Into<Vec<u8>>) -> JobHandle {
        let id = self.inner.next_job_id.fetch_add(1, Ordering::Relaxed);
        let command = command.into();

        if command.trim().is_empty() {
            return JobHandle::ready(id, Err(Error::EmptyCommand));
        }

        let running = match self.running() {
            Ok(running) => running,
            Err(e) => return JobHandle::ready(id, Err(e)),
        };

        let Some(queue) = lock(&running.queue).clone() else {
            return JobHandle::ready(id, Err(Error::PoolClosed));
        };

        let (sink, handle) = job::channel(id);
        let job = Job {
            id,
            command,
            input: input.into(),
            sink,
        };

        tracing::debug!(job_id = id, command = %job.command, "Job submitted");

        running.runtime.spawn(admit(
            job,
            running.slots.clone(),
            queue,
            running.config.admission_timeout,
        ));

        handle
    }

    /// Stop accepting jobs, let admitted jobs finish, and wait for the workers.
    ///
    /// Jobs still waiting for a slot fail with [`Error::PoolClosed`]. Calling
    /// this more than once is harmless.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);

        let Some(running) = self.inner.running.get() else {
            return;
        };

        running.slots.close();
        lock(&running.queue).take();

        let workers = std::mem::take(&mut *lock(&running.workers));
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Worker ended abnormally");
            }
        }

        tracing::debug!("Pool shut down");
    }

    fn running(&self) -> Result<&Running> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::PoolClosed);
        }
        if let Some(running) = self.inner.running.get() {
            return Ok(running);
        }

        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let config = lock(&self.inner.config);
        Ok(self
            .inner
            .running
            .get_or_init(|| Running::spawn(config.clone(), runtime, &self.inner.spawned_workers)))
    }
}

impl Running {
    fn spawn(config: PoolConfig, runtime: Handle, spawned: &AtomicUsize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue: worker::JobQueue = Arc::new(tokio::sync::Mutex::new(rx));
        let executor = Arc::new(Executor::new(config.shell.clone()));

        let workers = (0..config.workers)
            .map(|worker_id| {
                spawned.fetch_add(1, Ordering::SeqCst);
                runtime.spawn(worker::run(
                    worker_id,
                    queue.clone(),
                    executor.clone(),
                    config.completion_timeout,
                ))
            })
            .collect();

        tracing::info!(
            workers = config.workers,
            admission_timeout_ms = config.admission_timeout.as_millis() as u64,
            completion_timeout_ms = config.completion_timeout.as_millis() as u64,
            shell = %config.shell,
            "Pool started"
        );

        Self {
            slots: Arc::new(Semaphore::new(config.workers)),
            config,
            runtime,
            queue: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }
}

/// Race a free worker slot against the admission deadline.
async fn admit(
    job: Job,
    slots: Arc<Semaphore>,
    queue: mpsc::UnboundedSender<QueuedJob>,
    admission_timeout: Duration,
) {
    match tokio::time::timeout(admission_timeout, slots.acquire_owned()).await {
        Ok(Ok(slot)) => {
            if let Err(mpsc::error::SendError(rejected)) = queue.send(QueuedJob { job, slot }) {
                rejected.job.sink.complete(Err(Error::PoolClosed));
            }
        }
        Ok(Err(_)) => job.sink.complete(Err(Error::PoolClosed)),
        Err(_) => {
            tracing::warn!(
                job_id = job.id,
                timeout_ms = admission_timeout.as_millis() as u64,
                "No worker available; job rejected"
            );
            job.sink
                .complete(Err(Error::AdmissionTimeout(admission_timeout)));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = Pool::new(PoolConfig::default().with_workers(0));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let pool = Pool::default();
        assert!(matches!(pool.start(), Err(Error::NoRuntime)));
        assert!(!pool.is_started());
        assert_eq!(pool.spawned_workers(), 0);
    }

    #[test]
    fn test_submit_outside_runtime_reports_no_runtime() {
        let pool = Pool::default();
        let result = pool.submit("cat", "x").blocking_recv();
        assert!(matches!(result, Err(Error::NoRuntime)));
    }

    #[test]
    fn test_set_config_before_start() {
        let pool = Pool::default();
        pool.set_config(PoolConfig::default().with_workers(5)).unwrap();
        assert_eq!(pool.config().workers, 5);
    }

    #[tokio::test]
    async fn test_set_config_after_start_fails() {
        let pool = Pool::default();
        pool.start().unwrap();

        let result = pool.set_config(PoolConfig::default().with_workers(9));
        assert!(matches!(result, Err(Error::AlreadyStarted)));
        assert_eq!(pool.config().workers, 3);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let pool = Pool::new(PoolConfig::default().with_workers(2)).unwrap();
        pool.start().unwrap();
        pool.start().unwrap();
        pool.clone().start().unwrap();

        assert!(pool.is_started());
        assert_eq!(pool.spawned_workers(), 2);
    }

    #[tokio::test]
    async fn test_empty_command_rejected_without_starting() {
        let pool = Pool::default();
        let result = pool.submit("", "input").await;

        assert!(matches!(result, Err(Error::EmptyCommand)));
        assert!(!pool.is_started());
    }

    #[tokio::test]
    async fn test_job_ids_increase() {
        let pool = Pool::default();
        let first = pool.submit("cat", "a");
        let second = pool.submit("cat", "b");
        assert!(second.job_id() > first.job_id());
    }
}
