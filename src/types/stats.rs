//! Aggregate counters produced by a scheduler run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Per-analyzer counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerStats {
    pub successful: usize,
    pub failed: usize,
    pub failed_sources: Vec<PathBuf>,
    pub version: String,
}

/// Analyzer name to counters. Reset at the start of every scheduler run.
pub type AnalyzerStatistics = BTreeMap<String, AnalyzerStats>;

/// Lifecycle of the analysis scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Idle,
    Dispatching,
    Aggregating,
    Done,
    Interrupted,
}

/// Summary handed upward to the storage/reporting layer.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub state: SchedulerState,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub reanalyzed: usize,
    pub cancelled: usize,
    pub statistics: AnalyzerStatistics,
    pub duration_ms: u128,
}

impl RunSummary {
    /// Number of units that reached a terminal analysis outcome.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.successful + self.failed
    }
}
