//! Command execution and output capture.

use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Instant;

use crate::cancel::Interrupt;
use crate::types::{display_command, CommandResult};

use super::group::{self, ProcessHandle};

/// Spawns one external tool per call, each in its own process group.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    interrupt: Option<Interrupt>,
}

impl ProcessRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every spawned group with `interrupt` while it runs.
    #[must_use]
    pub fn with_interrupt(interrupt: Interrupt) -> Self {
        Self {
            interrupt: Some(interrupt),
        }
    }

    /// Runs `command` to completion without a start hook.
    #[must_use]
    pub fn run_simple(&self, command: &[String], cwd: &Path) -> CommandResult {
        self.run(command, &[], cwd, |_| {})
    }

    /// Runs `command` in `cwd` with extra environment variables and captures
    /// stdout/stderr separately.
    ///
    /// `on_start` is invoked exactly once with the live handle, before the
    /// runner blocks on the process; it is not invoked when nothing could be
    /// spawned, in which case the result carries exit code -1 and a
    /// `Failed to execute` marker in stderr.
    pub fn run<F>(
        &self,
        command: &[String],
        env: &[(String, String)],
        cwd: &Path,
        on_start: F,
    ) -> CommandResult
    where
        F: FnOnce(&ProcessHandle),
    {
        let start = Instant::now();
        let shown = display_command(command);

        let Some((program, args)) = command.split_first() else {
            return CommandResult::not_started(shown, "Failed to execute: empty command");
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        group::isolate(&mut cmd);

        tracing::debug!(cwd = %cwd.display(), "running {shown}");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return CommandResult::not_started(
                    shown,
                    &format!("Failed to execute {program}: {e}"),
                );
            }
        };

        let handle = ProcessHandle::new(child.id());
        let _live = self.interrupt.as_ref().map(|i| i.register(handle));

        let out_thread = child.stdout.take().map(spawn_stream_reader);
        let err_thread = child.stderr.take().map(spawn_stream_reader);

        on_start(&handle);

        let status = child.wait();
        let stdout = join_reader(out_thread);
        let mut stderr = join_reader(err_thread);

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let exit_code = match status {
            Ok(status) => exit_code_of(status),
            Err(e) => {
                stderr.push_str(&format!("\nFailed to wait for {program}: {e}"));
                crate::types::NO_EXIT_CODE
            }
        };

        CommandResult::new(shown, exit_code, stdout, stderr, duration_ms)
    }
}

fn spawn_stream_reader<R: Read + Send + 'static>(mut input: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = input.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(reader: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Exit code, or the negated signal number when the process was killed.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return -sig;
        }
    }
    crate::types::NO_EXIT_CODE
}
