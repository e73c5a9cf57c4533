//! Cross-thread termination of a running command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Thread-safe handle for killing a command from another thread.
///
/// The executor registers the child's pid once it is spawned and clears it
/// only after the child has exited but before it is reaped, under the same
/// lock the kill path takes. Until then the pid stays reserved, so a kill can
/// reach a command that closed its own pipes, yet never signals a pid that
/// has been reaped and reused.
#[derive(Clone, Default)]
pub struct KillHandle {
    inner: Arc<KillState>,
}

#[derive(Default)]
struct KillState {
    /// Pid of the child, which also leads its own process group on unix.
    pid: Mutex<Option<u32>>,
    /// Whether a kill has been requested.
    killed: AtomicBool,
}

impl KillHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the registered child and its process group.
    ///
    /// If no child is registered yet, the request is remembered and applied
    /// as soon as one is. Returns `true` if a signal was sent now.
    pub fn kill(&self) -> bool {
        self.inner.killed.store(true, Ordering::SeqCst);

        let pid = self.inner.pid.lock().unwrap_or_else(PoisonError::into_inner);
        match *pid {
            Some(pid) => {
                signal_group(pid);
                true
            }
            None => false,
        }
    }

    /// Check if kill has been requested.
    pub fn is_killed(&self) -> bool {
        self.inner.killed.load(Ordering::SeqCst)
    }

    pub(crate) fn register(&self, child_pid: u32) {
        let mut pid = self.inner.pid.lock().unwrap_or_else(PoisonError::into_inner);
        *pid = Some(child_pid);
        if self.is_killed() {
            signal_group(child_pid);
        }
    }

    /// Forget the child. Must run after it exits and before it is reaped.
    pub(crate) fn release(&self) {
        let mut pid = self.inner.pid.lock().unwrap_or_else(PoisonError::into_inner);
        *pid = None;
    }
}

#[cfg(unix)]
pub(crate) fn signal_group(pid: u32) {
    // SIGKILL the whole group so grandchildren holding our pipes die too
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH means the group already exited, which is fine
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pid, error = %err, "Failed to kill command");
        }
    } else {
        tracing::debug!(pid, "Sent SIGKILL to command process group");
    }
}

#[cfg(not(unix))]
pub(crate) fn signal_group(pid: u32) {
    tracing::warn!(pid, "Terminating commands is only supported on unix; waiting for natural exit");
}

/// Block until `pid` has exited, leaving it unreaped.
///
/// The zombie keeps the pid and its process group id reserved until the
/// caller's own `wait`.
#[cfg(unix)]
pub(crate) fn wait_exited(pid: u32) {
    loop {
        // SAFETY: siginfo_t is plain data and waitid only writes into it.
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            return;
        }

        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            tracing::warn!(pid, error = %err, "Failed to wait for command exit");
            return;
        }
    }
}
