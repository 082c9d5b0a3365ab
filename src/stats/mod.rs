//! Return-value statistics gathered during pre-analysis.

pub mod collector;
pub mod postprocess;

pub use collector::{build_stats_command, collect_statistics};
pub use postprocess::{postprocess_stats, ReturnValueStats, StatsReport};

/// Raw collector output lives in this subfolder of the statistics directory
/// and is removed once postprocessing has run.
pub const RAW_STATS_FOLDER: &str = "tmp";
