//! Batch command implementation for piperun CLI.
//!
//! Submits one job per input file through a shared pool and reports each
//! outcome as a JSON line, in argument order.

use std::path::{Path, PathBuf};

use piperun_core::{JobHandle, JobResult, Pool, PoolConfig};
use serde::Serialize;

/// One line of batch output.
#[derive(Debug, Serialize)]
struct BatchLine {
    file: String,
    ok: bool,
    /// Command output, or its diagnostics when it wrote to stderr.
    output: String,
    error: Option<String>,
}

impl BatchLine {
    fn from_result(file: &Path, result: JobResult) -> Self {
        let file = file.display().to_string();
        match result {
            Ok(output) => Self {
                file,
                ok: true,
                output: String::from_utf8_lossy(&output).into_owned(),
                error: None,
            },
            Err(e) => Self {
                file,
                ok: false,
                output: String::from_utf8_lossy(e.output()).into_owned(),
                error: Some(e.to_string()),
            },
        }
    }

    fn unreadable(file: &Path, error: std::io::Error) -> Self {
        Self {
            file: file.display().to_string(),
            ok: false,
            output: String::new(),
            error: Some(format!("failed to read input: {}", error)),
        }
    }
}

/// Execute `command` over every file in `files`.
pub async fn execute(command: &str, files: &[PathBuf], config: PoolConfig) -> anyhow::Result<()> {
    let pool = Pool::new(config)?;

    // Submit everything first so the jobs run concurrently
    let mut pending: Vec<(&PathBuf, std::io::Result<JobHandle>)> = Vec::with_capacity(files.len());
    for file in files {
        let job = tokio::fs::read(file)
            .await
            .map(|input| pool.submit(command, input));
        pending.push((file, job));
    }

    let mut failed = 0;
    for (file, job) in pending {
        let line = match job {
            Ok(handle) => BatchLine::from_result(file, handle.await),
            Err(e) => BatchLine::unreadable(file, e),
        };
        if !line.ok {
            tracing::debug!(file = %line.file, error = ?line.error, "Batch job failed");
            failed += 1;
        }
        println!("{}", serde_json::to_string(&line)?);
    }

    pool.shutdown().await;

    if failed > 0 {
        anyhow::bail!("{} of {} jobs failed", failed, files.len());
    }
    Ok(())
}
