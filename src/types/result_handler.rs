//! Per-invocation result record.

use std::path::{Path, PathBuf};

use super::action::AnalyzerType;
use super::command::CommandResult;
use super::outcome::{FailureKind, TIMEOUT_RETURN_CODE};

/// Mutable record for one analyzer invocation.
///
/// Created fresh per compilation action (and per retry attempt) and dropped
/// once its outcome has been folded into the scheduler's counters.
#[derive(Debug, Clone)]
pub struct ResultHandler {
    pub analyzer_type: AnalyzerType,
    pub analyzer_cmd: Vec<String>,
    pub analyzer_returncode: i32,
    pub analyzer_stdout: String,
    pub analyzer_stderr: String,
    /// Final artifact path.
    pub analyzer_result_file: PathBuf,
    /// Where the analyzer writes before the artifact is persisted.
    pub raw_output_file: PathBuf,
    pub analyzed_source_file: PathBuf,
    pub ctu_enabled: bool,
    pub timed_out: bool,
}

impl ResultHandler {
    #[must_use]
    pub fn new(analyzer_type: AnalyzerType, result_file: PathBuf, source: PathBuf) -> Self {
        Self {
            analyzer_type,
            analyzer_cmd: Vec::new(),
            analyzer_returncode: 0,
            analyzer_stdout: String::new(),
            analyzer_stderr: String::new(),
            raw_output_file: result_file.clone(),
            analyzer_result_file: result_file,
            analyzed_source_file: source,
            ctu_enabled: false,
            timed_out: false,
        }
    }

    /// Base name shared by every file derived from this result
    /// (artifact without extension).
    #[must_use]
    pub fn result_base(&self) -> String {
        self.analyzer_result_file
            .file_stem()
            .map_or_else(String::new, |s| s.to_string_lossy().into_owned())
    }

    /// Path of the sidecar that records the analyzed source for the artifact.
    #[must_use]
    pub fn source_sidecar(&self) -> PathBuf {
        sidecar_path(&self.analyzer_result_file)
    }

    /// Copies the outcome of a finished process into the record.
    pub fn absorb(&mut self, result: CommandResult) {
        let (code, stdout, stderr) = result.into_parts();
        self.analyzer_returncode = code;
        self.analyzer_stdout = stdout;
        self.analyzer_stderr = stderr;
    }

    /// Marks the invocation as killed by the timeout watcher.
    pub fn mark_timed_out(&mut self, timeout_secs: u64) {
        self.timed_out = true;
        self.analyzer_returncode = TIMEOUT_RETURN_CODE;
        self.analyzer_stderr = format!(
            "[ctupipe] Analyzer timed out after {timeout_secs} seconds.\n{}",
            self.analyzer_stderr
        );
    }

    /// Default classification: a timeout wins over whatever code the killed process left.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.timed_out {
            return Some(FailureKind::Timeout);
        }
        FailureKind::from_exit_code(self.analyzer_returncode)
    }
}

/// `<artifact>.source`
#[must_use]
pub fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_os_string();
    name.push(".source");
    PathBuf::from(name)
}
