//! Pre-analysis pass: CTU preprocessing and statistics collection fanned out
//! over a worker pool, followed by the single-threaded merge.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::cancel::Interrupt;
use crate::config::Config;
use crate::ctu::{self, CtuPrepOutcome, CtuPreprocessor, MergeReport};
use crate::error::{IoResultExt, Result};
use crate::pool::WorkerPool;
use crate::process::ProcessRunner;
use crate::progress::Progress;
use crate::skiplist::SkipList;
use crate::stats::{self, StatsReport, RAW_STATS_FOLDER};
use crate::types::CompilationAction;

/// Lifecycle of one pre-analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreAnalysisState {
    Idle,
    Running,
    Merging,
    Done,
    Interrupted,
}

/// What one worker did for one action.
#[derive(Debug, Clone, Default)]
struct UnitOutcome {
    ctu: Option<CtuPrepOutcome>,
    stats_collected: bool,
}

/// Counters and merge results of a pre-analysis pass.
#[derive(Debug, Clone)]
pub struct PreAnalysisReport {
    pub state: PreAnalysisState,
    pub dispatched: usize,
    pub skipped: usize,
    /// Actions whose analyzer takes no part in pre-analysis.
    pub unsupported: usize,
    pub ctu_prepared: usize,
    pub ctu_failed: usize,
    pub stats_collected: usize,
    pub merge: MergeReport,
    pub stats: Option<StatsReport>,
    pub duration_ms: u128,
}

impl PreAnalysisReport {
    fn new() -> Self {
        Self {
            state: PreAnalysisState::Idle,
            dispatched: 0,
            skipped: 0,
            unsupported: 0,
            ctu_prepared: 0,
            ctu_failed: 0,
            stats_collected: 0,
            merge: MergeReport::default(),
            stats: None,
            duration_ms: 0,
        }
    }
}

/// Runs the pre-analysis pass for one set of actions.
pub struct PreAnalysisScheduler<'a> {
    config: &'a Config,
    skip: &'a dyn SkipList,
    interrupt: Interrupt,
    state: PreAnalysisState,
}

impl<'a> PreAnalysisScheduler<'a> {
    #[must_use]
    pub fn new(config: &'a Config, skip: &'a dyn SkipList, interrupt: Interrupt) -> Self {
        Self {
            config,
            skip,
            interrupt,
            state: PreAnalysisState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> PreAnalysisState {
        self.state
    }

    /// Runs the pass to `Done`, or to `Interrupted` if the interrupt fires
    /// while workers are running (merge and postprocessing are then skipped).
    ///
    /// # Errors
    /// Returns error if the pool cannot be built or the merge/postprocessing
    /// cannot read or write its files.
    pub fn run(&mut self, actions: &[CompilationAction]) -> Result<PreAnalysisReport> {
        let start = Instant::now();
        let mut report = PreAnalysisReport::new();

        let dispatch: Vec<&CompilationAction> = actions
            .iter()
            .filter(|action| {
                if self.skip.should_skip(&action.absolute_source()) {
                    report.skipped += 1;
                    return false;
                }
                if !action.analyzer_type.supports_pre_analysis() {
                    report.unsupported += 1;
                    return false;
                }
                true
            })
            .collect();
        report.dispatched = dispatch.len();

        let ctu_dir = self.config.ctu_dir();
        let stats_dir = self.config.stats_dir();
        let raw_stats_dir = stats_dir.join(RAW_STATS_FOLDER);
        self.prepare_dirs(&ctu_dir, &raw_stats_dir)?;

        self.state = PreAnalysisState::Running;
        tracing::info!(
            actions = report.dispatched,
            skipped = report.skipped,
            unsupported = report.unsupported,
            "pre-analysis started"
        );

        let pool = WorkerPool::new(self.config.analysis.jobs, "ctupipe-pre", self.interrupt.clone())?;
        let runner = ProcessRunner::with_interrupt(self.interrupt.clone());
        let progress = Arc::new(Progress::new(dispatch.len()));
        let preprocessor = CtuPreprocessor::new(
            &runner,
            &self.config.tools.clang,
            &self.config.tools.func_map_cmd,
            &ctu_dir,
        );

        let config = self.config;
        let outcome = pool.run(&dispatch, |action| {
            let unit = pre_analyze(config, &runner, &preprocessor, action, &raw_stats_dir);
            let checked = progress.tick();
            tracing::info!(
                "[{checked}/{}] pre-analyzed {}",
                progress.total(),
                action.absolute_source().display()
            );
            unit
        });

        let shutdown = outcome.is_shutdown();
        for unit in outcome.into_finished() {
            match unit.ctu {
                Some(CtuPrepOutcome::Prepared { .. }) => report.ctu_prepared += 1,
                Some(CtuPrepOutcome::Failed { .. }) => report.ctu_failed += 1,
                None => {}
            }
            if unit.stats_collected {
                report.stats_collected += 1;
            }
        }

        if shutdown {
            self.state = PreAnalysisState::Interrupted;
            report.state = self.state;
            report.duration_ms = start.elapsed().as_millis();
            tracing::warn!("pre-analysis interrupted, skipping merge");
            return Ok(report);
        }

        self.state = PreAnalysisState::Merging;
        if self.config.ctu.enabled {
            report.merge = ctu::merge_ctu_maps(&ctu_dir)?;
        }
        if self.config.statistics.enabled {
            report.stats = Some(stats::postprocess_stats(
                &raw_stats_dir,
                &stats_dir,
                self.config.statistics.min_sample_count,
                self.config.statistics.relevance_threshold,
            )?);
            if let Err(e) = fs::remove_dir_all(&raw_stats_dir) {
                tracing::debug!(dir = %raw_stats_dir.display(), "could not remove raw statistics: {e}");
            }
        }

        self.state = PreAnalysisState::Done;
        report.state = self.state;
        report.duration_ms = start.elapsed().as_millis();
        tracing::info!(
            prepared = report.ctu_prepared,
            failed = report.ctu_failed,
            map_entries = report.merge.total_entries(),
            "pre-analysis finished in {} ms",
            report.duration_ms
        );
        Ok(report)
    }

    fn prepare_dirs(&self, ctu_dir: &Path, raw_stats_dir: &Path) -> Result<()> {
        if self.config.ctu.enabled {
            if self.config.ctu.clean_before_collect && ctu_dir.exists() {
                fs::remove_dir_all(ctu_dir).at_path(ctu_dir)?;
            }
            fs::create_dir_all(ctu_dir).at_path(ctu_dir)?;
        }
        if self.config.statistics.enabled {
            fs::create_dir_all(raw_stats_dir).at_path(raw_stats_dir)?;
        }
        Ok(())
    }
}

fn pre_analyze(
    config: &Config,
    runner: &ProcessRunner,
    preprocessor: &CtuPreprocessor<'_>,
    action: &CompilationAction,
    raw_stats_dir: &Path,
) -> UnitOutcome {
    let mut unit = UnitOutcome::default();
    if config.ctu.enabled {
        unit.ctu = Some(preprocessor.prepare(action));
    }
    if config.statistics.enabled {
        unit.stats_collected =
            stats::collect_statistics(runner, &config.tools.clang, action, raw_stats_dir).is_some();
    }
    unit
}
