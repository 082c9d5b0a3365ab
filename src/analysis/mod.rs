// src/analysis/mod.rs
//! The analysis pass: every compilation action through its analyzer on a
//! bounded pool, then aggregation and output-directory housekeeping.

pub mod archive;
pub mod worker;

pub use archive::{archive_name, FailureArchive};
pub use worker::{analyze, WorkerContext, WorkerOutcome};

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use walkdir::WalkDir;

use crate::analyzers::Analyzers;
use crate::cancel::Interrupt;
use crate::config::Config;
use crate::error::{IoResultExt, Result};
use crate::metadata::RunMetadata;
use crate::pool::{PoolOutcome, WorkerPool};
use crate::process::ProcessRunner;
use crate::progress::Progress;
use crate::skiplist::SkipList;
use crate::types::{
    AnalysisStatus, AnalyzerStatistics, AnalyzerStats, CompilationAction, RunSummary,
    SchedulerState,
};

pub const SUCCESS_DIR: &str = "success";
pub const FAILED_DIR: &str = "failed";
/// Raw analyzer output is staged here before it is persisted.
pub const STAGING_DIR: &str = ".tmp";
const SIDECAR_EXT: &str = "source";

/// Actions keyed by absolute source path. The first action for a source wins.
pub type ActionMap = HashMap<PathBuf, CompilationAction>;

#[must_use]
pub fn build_action_map(actions: &[CompilationAction]) -> ActionMap {
    let mut map = ActionMap::with_capacity(actions.len());
    for action in actions {
        map.entry(action.absolute_source())
            .or_insert_with(|| action.clone());
    }
    map
}

pub struct AnalysisScheduler<'a> {
    config: &'a Config,
    analyzers: &'a Analyzers,
    skip: &'a dyn SkipList,
    interrupt: Interrupt,
    state: SchedulerState,
}

impl<'a> AnalysisScheduler<'a> {
    #[must_use]
    pub fn new(
        config: &'a Config,
        analyzers: &'a Analyzers,
        skip: &'a dyn SkipList,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            config,
            analyzers,
            skip,
            interrupt,
            state: SchedulerState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Analyzes `actions` and folds the results into `metadata`.
    ///
    /// Analyzer versions are read from `metadata`, so callers record them
    /// before the run. The returned summary is in `Interrupted` state when the
    /// interrupt fired during dispatch.
    ///
    /// # Errors
    /// Returns error if the output directories cannot be created or the
    /// worker pool cannot be built.
    pub fn run(
        &mut self,
        actions: &[CompilationAction],
        metadata: &mut RunMetadata,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let output_dir = &self.config.output_dir;

        let (dispatch, skipped): (Vec<&CompilationAction>, Vec<&CompilationAction>) = actions
            .iter()
            .partition(|action| !self.skip.should_skip(&action.absolute_source()));
        for action in &skipped {
            tracing::debug!(source = %action.absolute_source().display(), "skipped");
        }

        for dir in [
            output_dir.clone(),
            output_dir.join(SUCCESS_DIR),
            output_dir.join(FAILED_DIR),
            output_dir.join(STAGING_DIR),
        ] {
            fs::create_dir_all(&dir).at_path(&dir)?;
        }
        self.clear_previous_results(&dispatch);

        self.state = SchedulerState::Dispatching;
        tracing::info!(
            actions = dispatch.len(),
            skipped = skipped.len(),
            jobs = self.config.analysis.jobs,
            "analysis started"
        );

        let action_map = build_action_map(actions);
        let runner = ProcessRunner::with_interrupt(self.interrupt.clone());
        let progress = Progress::new(dispatch.len());
        let outcome = {
            let pool = WorkerPool::new(self.config.analysis.jobs, "ctupipe-worker", self.interrupt.clone())?;
            let ctx = WorkerContext {
                config: self.config,
                analyzers: self.analyzers,
                skip: self.skip,
                actions: &action_map,
                runner: &runner,
                progress: &progress,
                interrupt: &self.interrupt,
            };
            pool.run(&dispatch, |action| analyze(&ctx, action))
        };

        let abandoned = match &outcome {
            PoolOutcome::Shutdown { abandoned, .. } => *abandoned,
            PoolOutcome::Completed(_) => 0,
        };
        self.state = if outcome.is_shutdown() {
            tracing::warn!(abandoned, "analysis interrupted");
            SchedulerState::Interrupted
        } else {
            SchedulerState::Aggregating
        };

        let mut summary = RunSummary {
            state: self.state,
            successful: 0,
            failed: 0,
            skipped: skipped.len(),
            reanalyzed: 0,
            cancelled: abandoned,
            statistics: AnalyzerStatistics::new(),
            duration_ms: 0,
        };
        for result in outcome.into_finished() {
            let stats = summary
                .statistics
                .entry(result.analyzer.name().to_string())
                .or_insert_with(|| AnalyzerStats {
                    version: metadata.analyzer_version(result.analyzer),
                    ..AnalyzerStats::default()
                });
            match result.status {
                AnalysisStatus::Success => {
                    stats.successful += 1;
                    summary.successful += 1;
                }
                AnalysisStatus::Failed(_) => {
                    stats.failed += 1;
                    stats.failed_sources.push(result.source);
                    summary.failed += 1;
                }
                AnalysisStatus::Cancelled => summary.cancelled += 1,
            }
            if result.reanalyzed {
                summary.reanalyzed += 1;
            }
        }
        for stats in summary.statistics.values_mut() {
            stats.failed_sources.sort();
        }

        metadata.skipped += summary.skipped;
        metadata.record_statistics(&summary.statistics);
        fold_source_sidecars(output_dir, metadata)?;
        remove_dir_if_empty(&output_dir.join(SUCCESS_DIR));
        remove_dir_if_empty(&output_dir.join(FAILED_DIR));
        let staging = output_dir.join(STAGING_DIR);
        if let Err(e) = fs::remove_dir_all(&staging) {
            tracing::debug!(dir = %staging.display(), "could not remove staging directory: {e}");
        }

        if self.state == SchedulerState::Aggregating {
            self.state = SchedulerState::Done;
        }
        summary.state = self.state;
        summary.duration_ms = start.elapsed().as_millis();
        log_summary(&summary);
        Ok(summary)
    }
}

impl AnalysisScheduler<'_> {
    /// Removes reports an earlier run left for `dispatch`.
    ///
    /// Artifact names are stable across runs. Worker no-clobber persistence
    /// then only arbitrates between duplicate actions of the same run.
    fn clear_previous_results(&self, dispatch: &[&CompilationAction]) {
        let mut cleared = 0;
        for action in dispatch {
            let Some(driver) = self.analyzers.get(action.analyzer_type) else {
                continue;
            };
            let rh = driver.construct_result_handler(action, &self.config.output_dir);
            if rh.analyzer_result_file.exists() {
                cleared += 1;
            }
            worker::remove_if_present(&rh.analyzer_result_file);
            worker::remove_if_present(&rh.source_sidecar());
        }
        if cleared > 0 {
            tracing::info!(cleared, "replacing reports of a previous run");
        }
    }
}

fn log_summary(summary: &RunSummary) {
    for (analyzer, stats) in &summary.statistics {
        tracing::info!(
            successful = stats.successful,
            failed = stats.failed,
            "{analyzer} {}",
            stats.version
        );
        for source in &stats.failed_sources {
            tracing::debug!(analyzer = %analyzer, "failed: {}", source.display());
        }
    }
    tracing::info!(
        successful = summary.successful,
        failed = summary.failed,
        skipped = summary.skipped,
        reanalyzed = summary.reanalyzed,
        cancelled = summary.cancelled,
        "analysis summary ({} ms)",
        summary.duration_ms
    );
}

/// Moves every `<artifact>.source` sidecar into `metadata` and deletes it.
///
/// # Errors
/// Returns error if the output directory cannot be listed.
pub fn fold_source_sidecars(output_dir: &Path, metadata: &mut RunMetadata) -> Result<usize> {
    let mut folded = 0;
    for entry in WalkDir::new(output_dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension() != Some(OsStr::new(SIDECAR_EXT)) {
            continue;
        }
        match fs::read_to_string(path) {
            Ok(source) => {
                metadata
                    .result_source_files
                    .insert(path.with_extension(""), PathBuf::from(source.trim()));
                folded += 1;
            }
            Err(e) => tracing::debug!(path = %path.display(), "unreadable sidecar: {e}"),
        }
        if let Err(e) = fs::remove_file(path) {
            tracing::debug!(path = %path.display(), "could not remove sidecar: {e}");
        }
    }
    Ok(folded)
}

fn remove_dir_if_empty(dir: &Path) {
    let empty = fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    if empty {
        if let Err(e) = fs::remove_dir(dir) {
            tracing::debug!(dir = %dir.display(), "could not remove empty directory: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalyzerType;

    #[test]
    fn action_map_keeps_first_action() {
        let mut a = CompilationAction::new("a.c", "/b", AnalyzerType::ClangSa);
        a.original_command = "first".into();
        let mut b = a.clone();
        b.original_command = "second".into();
        let map = build_action_map(&[a, b]);
        assert_eq!(map.len(), 1);
        assert_eq!(map[&PathBuf::from("/b/a.c")].original_command, "first");
    }

    #[test]
    fn sidecars_fold_into_metadata() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.c_clangsa_00.plist"), "x").unwrap();
        fs::write(dir.path().join("a.c_clangsa_00.plist.source"), "/src/a.c\n").unwrap();
        let mut meta = RunMetadata::new(dir.path());

        assert_eq!(fold_source_sidecars(dir.path(), &mut meta).unwrap(), 1);
        assert_eq!(
            meta.result_source_files[&dir.path().join("a.c_clangsa_00.plist")],
            PathBuf::from("/src/a.c")
        );
        assert!(!dir.path().join("a.c_clangsa_00.plist.source").exists());
        assert!(dir.path().join("a.c_clangsa_00.plist").exists());
    }

    #[test]
    fn only_empty_dirs_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("success");
        let full = dir.path().join("failed");
        fs::create_dir_all(&empty).unwrap();
        fs::create_dir_all(&full).unwrap();
        fs::write(full.join("x.json"), "{}").unwrap();
        remove_dir_if_empty(&empty);
        remove_dir_if_empty(&full);
        assert!(!empty.exists());
        assert!(full.exists());
    }
}
