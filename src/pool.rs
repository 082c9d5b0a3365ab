//! Bounded worker pool shared by the pre-analysis and analysis passes.

use rayon::prelude::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

use crate::cancel::Interrupt;
use crate::error::Result;

/// What the pool's join returns.
#[derive(Debug)]
pub enum PoolOutcome<T> {
    /// Every item was dispatched and returned.
    Completed(Vec<T>),
    /// An interrupt stopped dispatch; `finished` holds units that returned.
    Shutdown { finished: Vec<T>, abandoned: usize },
}

impl<T> PoolOutcome<T> {
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown { .. })
    }

    /// Results of every unit that ran, regardless of how the pool stopped.
    #[must_use]
    pub fn into_finished(self) -> Vec<T> {
        match self {
            Self::Completed(results) | Self::Shutdown { finished: results, .. } => results,
        }
    }
}

/// A dedicated thread pool; each unit blocks on its own analyzer subprocess.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    interrupt: Interrupt,
}

impl WorkerPool {
    /// Builds a pool of `jobs` workers (at least one).
    ///
    /// # Errors
    /// Returns error if the OS refuses to spawn the worker threads.
    pub fn new(jobs: usize, name: &'static str, interrupt: Interrupt) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .thread_name(move |i| format!("{name}-{i}"))
            .build()?;
        Ok(Self { pool, interrupt })
    }

    /// Fans `work` out over `items` and blocks until every dispatched unit returned.
    ///
    /// Units not yet started when the interrupt fires are never run.
    pub fn run<I, T, F>(&self, items: &[I], work: F) -> PoolOutcome<T>
    where
        I: Sync,
        T: Send,
        F: Fn(&I) -> T + Sync + Send,
    {
        let interrupt = &self.interrupt;
        let results: Vec<Option<T>> = self.pool.install(|| {
            items
                .par_iter()
                .with_max_len(1)
                .map(|item| {
                    if interrupt.is_cancelled() {
                        None
                    } else {
                        Some(work(item))
                    }
                })
                .collect()
        });

        let total = results.len();
        let finished: Vec<T> = results.into_iter().flatten().collect();

        if interrupt.is_cancelled() {
            PoolOutcome::Shutdown {
                abandoned: total - finished.len(),
                finished,
            }
        } else {
            PoolOutcome::Completed(finished)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn completes_every_item() {
        let pool = WorkerPool::new(3, "test-pool", Interrupt::new()).unwrap();
        let items: Vec<usize> = (0..20).collect();
        let outcome = pool.run(&items, |i| i * 2);
        assert!(!outcome.is_shutdown());
        let mut results = outcome.into_finished();
        results.sort_unstable();
        assert_eq!(results, (0..20).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn interrupt_stops_dispatch() {
        let interrupt = Interrupt::new();
        let pool = WorkerPool::new(1, "test-pool", interrupt.clone()).unwrap();
        let ran = AtomicUsize::new(0);
        let items: Vec<usize> = (0..10).collect();
        let outcome = pool.run(&items, |_| {
            if ran.fetch_add(1, Ordering::SeqCst) == 2 {
                interrupt.trigger();
            }
        });
        match outcome {
            PoolOutcome::Shutdown { finished, abandoned } => {
                assert_eq!(finished.len(), ran.load(Ordering::SeqCst));
                assert_eq!(finished.len() + abandoned, 10);
                assert!(abandoned > 0);
            }
            PoolOutcome::Completed(_) => panic!("expected shutdown"),
        }
    }

    #[test]
    fn zero_jobs_still_runs() {
        let pool = WorkerPool::new(0, "test-pool", Interrupt::new()).unwrap();
        assert_eq!(pool.run(&[1, 2, 3], |i| *i).into_finished().len(), 3);
    }
}
