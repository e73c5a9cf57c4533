//! Jobs and one-shot result delivery.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{OwnedSemaphorePermit, oneshot};

use crate::error::{Error, Result};

/// Outcome of one job: the command's stdout, or why there is none.
pub type JobResult = Result<Vec<u8>>;

/// One unit of work travelling from `submit` to a worker.
pub(crate) struct Job {
    pub id: u64,
    pub command: String,
    pub input: Vec<u8>,
    pub sink: ResultSink,
}

/// A job that holds a worker slot and is waiting in the queue.
pub(crate) struct QueuedJob {
    pub job: Job,
    /// Released once the worker is ready for another job.
    pub slot: OwnedSemaphorePermit,
}

/// Write side of a job's result channel.
///
/// [`ResultSink::complete`] consumes the sink, so a job can be answered at
/// most once. Dropping it unanswered surfaces as [`Error::WorkerLost`].
pub(crate) struct ResultSink {
    job_id: u64,
    tx: oneshot::Sender<JobResult>,
}

impl ResultSink {
    pub fn complete(self, result: JobResult) {
        if self.tx.send(result).is_err() {
            tracing::debug!(job_id = self.job_id, "Caller dropped the job handle; result discarded");
        }
    }
}

/// Read side of a job's result channel, returned by [`Pool::submit`](crate::Pool::submit).
///
/// Await it from async code, or call [`JobHandle::blocking_recv`] from a
/// plain thread. Dropping the handle discards the result but does not
/// cancel the job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: u64,
    rx: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    /// Identifier assigned at submission, as seen in log events.
    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// Block the current thread until the result arrives.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context;
    /// `.await` the handle there instead.
    pub fn blocking_recv(self) -> JobResult {
        self.rx.blocking_recv().unwrap_or(Err(Error::WorkerLost))
    }

    /// A handle that is already answered.
    pub(crate) fn ready(job_id: u64, result: JobResult) -> Self {
        let (sink, handle) = channel(job_id);
        sink.complete(result);
        handle
    }
}

impl Future for JobHandle {
    type Output = JobResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::WorkerLost)))
    }
}

pub(crate) fn channel(job_id: u64) -> (ResultSink, JobHandle) {
    let (tx, rx) = oneshot::channel();
    (ResultSink { job_id, tx }, JobHandle { job_id, rx })
}
