//! Error types for piperun-core.

use std::time::Duration;

use thiserror::Error;

/// Result type for piperun-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while admitting, running or configuring jobs.
#[derive(Debug, Error)]
pub enum Error {
    /// No worker became free within the admission window. The job never ran.
    #[error("no worker became available within {0:?}")]
    AdmissionTimeout(Duration),

    /// The worker stopped waiting for the command. The child was terminated.
    #[error("completion timed out after {0:?}")]
    CompletionTimeout(Duration),

    /// A pipe to the child process could not be acquired.
    #[error("failed to acquire child {0}")]
    StreamAcquisition(&'static str),

    /// The shell could not be started.
    #[error("failed to start shell: {0}")]
    ProcessStart(#[source] std::io::Error),

    /// Reading the command's standard output failed.
    #[error("failed to read stdout: {0}")]
    OutputRead(#[source] std::io::Error),

    /// Reading the command's standard error failed.
    #[error("failed to read stderr: {0}")]
    ErrorRead(#[source] std::io::Error),

    /// Writing the input payload failed for a reason other than a closed pipe.
    #[error("failed to write stdin: {0}")]
    InputWrite(#[source] std::io::Error),

    /// The command wrote to its standard error.
    ///
    /// The payload is the raw stderr output; see [`Error::output`].
    #[error("stderr")]
    Stderr(Vec<u8>),

    /// The command string was empty.
    #[error("command is empty")]
    EmptyCommand,

    /// Configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration cannot change once workers are running.
    #[error("pool already started")]
    AlreadyStarted,

    /// The pool was started outside a tokio runtime.
    #[error("pool must be started from within a tokio runtime")]
    NoRuntime,

    /// The pool has been shut down.
    #[error("pool is shut down")]
    PoolClosed,

    /// The result sink was dropped without a result, e.g. on runtime teardown.
    #[error("job was dropped before producing a result")]
    WorkerLost,
}

impl Error {
    /// Bytes that accompany this error.
    ///
    /// For [`Error::Stderr`] this is the command's diagnostic text; for every
    /// other error it is empty.
    pub fn output(&self) -> &[u8] {
        match self {
            Self::Stderr(bytes) => bytes,
            _ => &[],
        }
    }

    /// Whether this is an admission or completion timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AdmissionTimeout(_) | Self::CompletionTimeout(_))
    }
}
