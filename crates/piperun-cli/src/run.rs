//! Run command implementation for piperun CLI.
//!
//! Feeds stdin to a single job and copies its output to stdout.

use anyhow::Context;
use piperun_core::{Pool, PoolConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Execute one command over stdin.
pub async fn execute(command: &str, config: PoolConfig) -> anyhow::Result<()> {
    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("failed to read stdin")?;

    let pool = Pool::new(config)?;
    let result = pool.submit(command, input).await;
    pool.shutdown().await;

    match result {
        Ok(output) => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&output).await?;
            stdout.flush().await?;
            Ok(())
        }
        Err(e) => {
            // Pass the command's own diagnostics through untouched
            if !e.output().is_empty() {
                let mut stderr = tokio::io::stderr();
                stderr.write_all(e.output()).await?;
                stderr.flush().await?;
            }
            Err(e).with_context(|| format!("command failed: {command}"))
        }
    }
}
