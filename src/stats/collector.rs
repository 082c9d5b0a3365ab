//! Statistics-collector invocation for one action.

use std::fs;
use std::path::{Path, PathBuf};

use crate::process::ProcessRunner;
use crate::types::CompilationAction;

/// Checkers that print return-value usage statistics instead of reports.
pub const STATS_CHECKERS: &str =
    "statisticsCollector.ReturnValueCheck,statisticsCollector.SpecialReturnValue";

#[cfg(unix)]
const NULL_OUTPUT: &str = "/dev/null";
#[cfg(not(unix))]
const NULL_OUTPUT: &str = "NUL";

/// Builds the collector command for `action`.
#[must_use]
pub fn build_stats_command(clang: &str, action: &CompilationAction) -> Vec<String> {
    let mut cmd = vec![
        clang.to_string(),
        "--analyze".to_string(),
        "-Qunused-arguments".to_string(),
        "-Xclang".to_string(),
        format!("-analyzer-checker={STATS_CHECKERS}"),
        "-o".to_string(),
        NULL_OUTPUT.to_string(),
        "-x".to_string(),
        action.language.clone(),
    ];
    cmd.extend(action.compile_flags());
    cmd.push(action.absolute_source().to_string_lossy().into_owned());
    cmd
}

/// Runs the collector and stores stdout+stderr in `<raw_dir>/<source>_<uuid>.stat`.
///
/// Returns `None` (after logging) when the collector fails; the TU is then
/// simply left out of the statistics.
#[must_use]
pub fn collect_statistics(
    runner: &ProcessRunner,
    clang: &str,
    action: &CompilationAction,
    raw_dir: &Path,
) -> Option<PathBuf> {
    let cmd = build_stats_command(clang, action);
    let result = runner.run_simple(&cmd, &action.directory);
    if !result.passed() {
        tracing::warn!(
            source = %action.absolute_source().display(),
            exit_code = result.exit_code(),
            "statistics collection failed: {}\n{}",
            result.command(),
            result.stderr()
        );
        return None;
    }

    let file = raw_dir.join(format!(
        "{}_{}.stat",
        action.source_file_name(),
        uuid::Uuid::new_v4().simple()
    ));
    let written = fs::create_dir_all(raw_dir).and_then(|()| fs::write(&file, result.output()));
    match written {
        Ok(()) => Some(file),
        Err(e) => {
            tracing::warn!(file = %file.display(), "cannot store statistics output: {e}");
            None
        }
    }
}
