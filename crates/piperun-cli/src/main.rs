//! piperun CLI - run shell text transformations through a bounded worker pool.

mod batch;
mod run;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use piperun_core::PoolConfig;

#[derive(Parser)]
#[command(name = "piperun")]
#[command(about = "Run shell text-transformation commands through a bounded worker pool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    pool: PoolArgs,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Pool tunables. Unset flags fall back to `PIPERUN_*` variables, then defaults.
#[derive(Args)]
struct PoolArgs {
    /// Number of commands that may run in parallel
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Maximum time a job may wait for a free worker
    #[arg(long, global = true, value_name = "MS")]
    admission_timeout_ms: Option<u64>,

    /// Maximum time a command may run
    #[arg(long, global = true, value_name = "MS")]
    completion_timeout_ms: Option<u64>,

    /// Shell used to interpret the command
    #[arg(long, global = true)]
    shell: Option<String>,
}

impl PoolArgs {
    fn into_config(self) -> piperun_core::Result<PoolConfig> {
        let mut config = PoolConfig::from_env()?;

        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(ms) = self.admission_timeout_ms {
            config.admission_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.completion_timeout_ms {
            config.completion_timeout = Duration::from_millis(ms);
        }
        if let Some(shell) = self.shell {
            config.shell = shell;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command once with stdin as its input
    Run {
        /// Command line handed to the shell
        command: String,
    },

    /// Run a command over several input files concurrently
    Batch {
        /// Command line handed to the shell
        command: String,

        /// Files whose contents become the input of one job each
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    // stdout carries command output, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.pool.into_config()?;

    match cli.command {
        Commands::Run { command } => run::execute(&command, config).await?,
        Commands::Batch { command, files } => batch::execute(&command, &files, config).await?,
    }

    Ok(())
}
