//! Interrupt coordination shared by every worker of a scheduler run.
//!
//! Workers check the token cooperatively before starting a unit; the registry
//! of live process groups lets an operator interrupt kill work that is
//! already running instead of merely stopping dispatch.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::process::{KillSignal, ProcessHandle};

#[derive(Debug, Default)]
struct InterruptState {
    cancelled: AtomicBool,
    live: Mutex<HashSet<ProcessHandle>>,
}

/// Cancellation token plus the set of process groups currently running.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<InterruptState>,
}

impl Interrupt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Requests cancellation and kills every live process group.
    ///
    /// Returns the number of groups that were signalled.
    pub fn trigger(&self) -> usize {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let live = self.live();
        for handle in live.iter() {
            if let Err(e) = handle.signal_group(KillSignal::Kill) {
                tracing::debug!(pid = handle.pid(), "could not signal process group: {e}");
            }
        }
        tracing::warn!(groups = live.len(), "interrupt received, terminated running analyzers");
        live.len()
    }

    /// Tracks `handle` until the returned guard is dropped.
    ///
    /// A registration that races with [`Interrupt::trigger`] is killed on the spot.
    #[must_use]
    pub fn register(&self, handle: ProcessHandle) -> LiveGuard {
        let mut live = self.live();
        live.insert(handle);
        if self.is_cancelled() {
            let _ = handle.signal_group(KillSignal::Kill);
        }
        LiveGuard {
            interrupt: self.clone(),
            handle,
        }
    }

    /// Number of process groups currently registered.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live().len()
    }

    fn live(&self) -> MutexGuard<'_, HashSet<ProcessHandle>> {
        self.inner.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Unregisters a process group when dropped.
#[derive(Debug)]
pub struct LiveGuard {
    interrupt: Interrupt,
    handle: ProcessHandle,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.interrupt.live().remove(&self.handle);
    }
}
