//! Shared progress counters.
//!
//! Constructed once per scheduler run and handed to workers by `Arc`; never a
//! module-level global, so consecutive runs cannot leak counts into each other.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct Progress {
    checked: AtomicUsize,
    total: usize,
}

impl Progress {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            checked: AtomicUsize::new(0),
            total,
        }
    }

    /// Counts one finished unit and returns the new `checked` value.
    pub fn tick(&self) -> usize {
        self.checked.fetch_add(1, Ordering::SeqCst) + 1
    }

    #[must_use]
    pub fn checked(&self) -> usize {
        self.checked.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }
}
