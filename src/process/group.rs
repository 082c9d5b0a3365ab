//! Process-group signalling.
//!
//! Analyzer binaries spawn helpers that do not forward termination signals,
//! so every kill in this crate targets the whole group of the direct child.
//! On platforms without process groups the tree is terminated with `taskkill /T`.

use serde::{Deserialize, Serialize};
use std::io;

/// Signal used to stop a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KillSignal {
    #[default]
    Kill,
    Term,
    Int,
}

impl KillSignal {
    #[cfg(unix)]
    fn as_raw(self) -> libc::c_int {
        match self {
            Self::Kill => libc::SIGKILL,
            Self::Term => libc::SIGTERM,
            Self::Int => libc::SIGINT,
        }
    }
}

/// Live handle on a spawned process that leads its own process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    pid: u32,
}

impl ProcessHandle {
    #[must_use]
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The child is spawned with `process_group(0)`, so its group id is its pid.
    #[must_use]
    pub fn pgid(&self) -> u32 {
        self.pid
    }

    /// Sends `signal` to every process in the group.
    ///
    /// # Errors
    /// Returns the OS error, e.g. `ESRCH` when the group is already gone.
    pub fn signal_group(&self, signal: KillSignal) -> io::Result<()> {
        signal_group(self.pgid(), signal)
    }
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: KillSignal) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pgid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pgid out of range"))?;
    // 0 and 1 would address our own group and init.
    if pgid <= 1 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "refusing to signal pgid <= 1"));
    }
    // SAFETY: killpg takes plain integers and has no memory-safety preconditions.
    let rc = unsafe { libc::killpg(pgid, signal.as_raw()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn signal_group(pid: u32, _signal: KillSignal) -> io::Result<()> {
    let status = std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(io::ErrorKind::Other, "taskkill failed"))
    }
}

/// Puts the command in a fresh process group and clears the inherited signal mask.
///
/// The CLI blocks SIGINT/SIGTERM in every thread so a dedicated thread can
/// `sigwait` for them; children must not inherit that mask.
#[cfg(unix)]
pub(crate) fn isolate(cmd: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;

    cmd.process_group(0);
    // SAFETY: the closure only calls async-signal-safe libc functions on a
    // stack-local signal set between fork and exec.
    unsafe {
        cmd.pre_exec(|| {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigprocmask(libc::SIG_SETMASK, &set, std::ptr::null_mut());
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub(crate) fn isolate(_cmd: &mut std::process::Command) {}
