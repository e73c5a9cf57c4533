//! Runs one command through the shell and classifies the outcome.

use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;

use crate::error::{Error, Result};

#[cfg(unix)]
use super::kill;
use super::kill::KillHandle;

/// Synchronous command runner.
///
/// Spawns `<shell> -c <command>`, feeds the input on stdin, and collects
/// stdout and stderr. Every call owns its own process and pipes, so one
/// executor can be shared freely between worker threads.
///
/// Anything written to stderr fails the job, even when the command also
/// produced output and exited with status 0. The exit status is only logged.
#[derive(Debug, Clone)]
pub struct Executor {
    shell: String,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl Executor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Run `command` with `input` on its stdin and return its stdout.
    pub fn run(&self, command: &str, input: &[u8]) -> Result<Vec<u8>> {
        self.run_with(command, input, &KillHandle::new())
    }

    /// Like [`Executor::run`], but the child can be terminated through `kill`.
    ///
    /// Blocks until the child has been reaped.
    pub fn run_with(&self, command: &str, input: &[u8], kill: &KillHandle) -> Result<Vec<u8>> {
        if command.trim().is_empty() {
            return Err(Error::EmptyCommand);
        }

        tracing::debug!(shell = %self.shell, command, input_len = input.len(), "Spawning command");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a kill reaches everything the shell forks
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(Error::ProcessStart)?;
        kill.register(child.id());

        let mut guard = ChildGuard {
            child,
            kill,
            drained: false,
        };

        let stdin = guard
            .child
            .stdin
            .take()
            .ok_or(Error::StreamAcquisition("stdin"))?;
        let stdout = guard
            .child
            .stdout
            .take()
            .ok_or(Error::StreamAcquisition("stdout"))?;
        let stderr = guard
            .child
            .stderr
            .take()
            .ok_or(Error::StreamAcquisition("stderr"))?;

        // stdin and stderr get their own threads so that neither a command
        // that writes before reading all input nor a full stderr pipe can
        // stall the stdout read.
        let (output, diagnostics, written) = thread::scope(|scope| {
            let writer = scope.spawn(move || write_input(stdin, input));
            let err_reader = scope.spawn(move || read_stream(stderr));

            let output = read_stream(stdout);
            let diagnostics = err_reader
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stderr reader panicked")));
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));

            (output, diagnostics, written)
        });

        guard.drained = true;
        drop(guard);

        classify(output, diagnostics, written)
    }
}

/// Map the three stream outcomes onto a job result.
///
/// Priority: stdout failure, stderr content, stderr failure, stdin failure.
fn classify(
    output: io::Result<Vec<u8>>,
    diagnostics: io::Result<Vec<u8>>,
    written: io::Result<()>,
) -> Result<Vec<u8>> {
    let output = output.map_err(Error::OutputRead)?;

    match diagnostics {
        Ok(bytes) if !bytes.is_empty() => return Err(Error::Stderr(bytes)),
        Ok(_) => {}
        Err(e) => return Err(Error::ErrorRead(e)),
    }

    if let Err(e) = written {
        return Err(Error::InputWrite(e));
    }

    Ok(output)
}

fn write_input(mut stdin: impl Write, input: &[u8]) -> io::Result<()> {
    match stdin.write_all(input) {
        // The command finished without consuming all of its input
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!("Command closed stdin early");
            Ok(())
        }
        other => other,
    }
    // stdin is dropped here, signalling end of input
}

fn read_stream(mut stream: impl Read) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Reaps the child on every exit path of [`Executor::run_with`].
struct ChildGuard<'a> {
    child: Child,
    kill: &'a KillHandle,
    /// Whether all pipes reached EOF. If not, the child is killed before
    /// reaping so an early error return cannot hang on `wait`.
    drained: bool,
}

impl Drop for ChildGuard<'_> {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if !self.drained {
                kill::signal_group(self.child.id());
            }

            // Closed pipes do not mean the command is gone; it stays
            // killable until it has actually exited.
            kill::wait_exited(self.child.id());
        }
        #[cfg(not(unix))]
        {
            if !self.drained {
                let _ = self.child.kill();
            }
        }

        self.kill.release();

        match self.child.wait() {
            Ok(status) => tracing::debug!(pid = self.child.id(), %status, "Command exited"),
            Err(e) => tracing::warn!(pid = self.child.id(), error = %e, "Failed to reap command"),
        }
    }
}
