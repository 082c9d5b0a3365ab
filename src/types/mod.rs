//! Common data structures shared by the pre-analysis and analysis passes.

mod action;
mod command;
mod outcome;
mod result_handler;
mod stats;

pub use action::{ActionKey, AnalyzerType, CompilationAction};
pub use command::{display_command, CommandResult, NO_EXIT_CODE};
pub use outcome::{AnalysisStatus, FailureKind, TIMEOUT_RETURN_CODE};
pub use result_handler::{sidecar_path, ResultHandler};
pub use stats::{AnalyzerStatistics, AnalyzerStats, RunSummary, SchedulerState};
