//! Deferred, cancellable kill of a running process group.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use super::group::{KillSignal, ProcessHandle};

/// Kills a process group once its deadline passes unless polled first.
#[derive(Debug)]
pub struct TimeoutWatcher {
    cancel: Option<Sender<()>>,
    fired: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl TimeoutWatcher {
    /// Starts the deadline for `handle`.
    #[must_use]
    pub fn attach(handle: &ProcessHandle, timeout: Duration, signal: KillSignal) -> Self {
        let (tx, rx) = bounded::<()>(1);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let handle = *handle;

        let thread = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(timeout) {
                tracing::debug!(pid = handle.pid(), ?timeout, "deadline passed, killing process group");
                if let Err(e) = handle.signal_group(signal) {
                    tracing::debug!(pid = handle.pid(), "timeout kill failed: {e}");
                }
                flag.store(true, Ordering::SeqCst);
            }
        });

        Self {
            cancel: Some(tx),
            fired,
            thread: Some(thread),
        }
    }

    /// Cancels a pending kill and reports whether the watcher fired.
    ///
    /// Returns `false` when called before the deadline, `true` once the
    /// process group has been killed. Safe to call repeatedly.
    pub fn poll(&mut self) -> bool {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for TimeoutWatcher {
    fn drop(&mut self) {
        self.poll();
    }
}
