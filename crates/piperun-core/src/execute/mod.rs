//! Command execution.
//!
//! The [`Executor`] runs a single command to completion on the calling
//! thread; the [`KillHandle`] lets another thread terminate it.

mod executor;
mod kill;

pub use executor::Executor;
pub use kill::KillHandle;
