//! Bounded concurrency gateway for shell text-transformation commands.
//!
//! This crate provides:
//! - [`Executor`]: runs `sh -c <command>`, feeds input on stdin, returns stdout
//! - [`Pool`]: a fixed set of workers behind an admission deadline, each job
//!   bounded by a completion deadline
//! - [`PoolConfig`]: worker count, both timeouts and the shell
//!
//! ```no_run
//! use piperun_core::{Pool, PoolConfig};
//!
//! # async fn demo() -> piperun_core::Result<()> {
//! let pool = Pool::new(PoolConfig::default().with_workers(4))?;
//! let html = pool.submit("pandoc -f markdown -t html", "# Header\n").await?;
//! println!("{}", String::from_utf8_lossy(&html));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod execute;
pub mod pool;

pub use config::PoolConfig;
pub use error::{Error, Result};
pub use execute::{Executor, KillHandle};
pub use pool::{JobHandle, JobResult, Pool};
