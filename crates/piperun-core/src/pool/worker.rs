//! Worker loop and completion deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc};

use crate::error::Error;
use crate::execute::{Executor, KillHandle};

use super::job::{Job, QueuedJob};

/// How long past its deadline a killed command may take before we complain.
const KILL_GRACE: Duration = Duration::from_secs(1);

pub(crate) type JobQueue = Arc<Mutex<mpsc::UnboundedReceiver<QueuedJob>>>;

/// Pull jobs off the shared queue one at a time until the queue closes.
pub(crate) async fn run(
    worker_id: usize,
    queue: JobQueue,
    executor: Arc<Executor>,
    completion_timeout: Duration,
) {
    tracing::debug!(worker_id, shell = executor.shell(), "Worker started");

    loop {
        let next = queue.lock().await.recv().await;
        let Some(QueuedJob { job, slot }) = next else {
            break;
        };

        process(worker_id, job, &executor, completion_timeout).await;

        // The slot is only given back once the command has really exited
        drop(slot);
    }

    tracing::debug!(worker_id, "Worker stopped");
}

/// Run one job and answer its sink exactly once.
///
/// On timeout the caller is answered right away, the command's process group
/// is killed, and this function still waits for the executor to return so
/// the worker never overlaps two commands.
async fn process(
    worker_id: usize,
    job: Job,
    executor: &Arc<Executor>,
    completion_timeout: Duration,
) {
    let Job {
        id,
        command,
        input,
        sink,
    } = job;

    let started = Instant::now();
    let kill = KillHandle::new();

    let mut task = tokio::task::spawn_blocking({
        let executor = executor.clone();
        let kill = kill.clone();
        move || executor.run_with(&command, &input, &kill)
    });

    match tokio::time::timeout(completion_timeout, &mut task).await {
        Ok(joined) => {
            let result = joined.unwrap_or_else(|e| {
                tracing::error!(job_id = id, worker_id, error = %e, "Executor task failed");
                Err(Error::WorkerLost)
            });
            tracing::debug!(
                job_id = id,
                worker_id,
                ok = result.is_ok(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job finished"
            );
            sink.complete(result);
        }
        Err(_) => {
            tracing::warn!(
                job_id = id,
                worker_id,
                timeout_ms = completion_timeout.as_millis() as u64,
                "Job timed out; killing command"
            );
            sink.complete(Err(Error::CompletionTimeout(completion_timeout)));

            kill.kill();
            if let Err(e) = task.await {
                tracing::error!(job_id = id, worker_id, error = %e, "Executor task failed after timeout");
            }

            let elapsed = started.elapsed();
            if elapsed.saturating_sub(completion_timeout) > KILL_GRACE {
                tracing::warn!(
                    job_id = id,
                    worker_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Command outlived its kill; worker was held until it exited"
                );
            }
        }
    }
}
