//! Debugging archives for failed analyzer invocations.
//!
//! One JSON document per failure holding everything needed to reproduce it
//! off-line: the build action, the analyzer argv and output, the toolchain,
//! and the build actions of every AST the analyzer imported through CTU.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::ctu::source_of_ast;
use crate::error::{IoResultExt, Result};
use crate::types::{AnalyzerType, CompilationAction, FailureKind, ResultHandler};

use super::ActionMap;

static LOADED_AST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)CTU loaded AST file: (.+?)\s*$").unwrap_or_else(|_| panic!("Invalid Regex"))
});

/// Marker inserted before the failure suffix for CTU attempts.
pub const CTU_MARKER: &str = "_ctu";

/// The part of a build action needed to replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedAction {
    pub source: PathBuf,
    pub directory: PathBuf,
    pub target: String,
    pub command: String,
}

impl From<&CompilationAction> for ArchivedAction {
    fn from(action: &CompilationAction) -> Self {
        Self {
            source: action.absolute_source(),
            directory: action.directory.clone(),
            target: action.target.clone(),
            command: action.original_command.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureArchive {
    pub analyzer: AnalyzerType,
    pub failure: FailureKind,
    pub ctu: bool,
    pub build_action: ArchivedAction,
    pub analyzer_command: Vec<String>,
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub toolchain: Option<String>,
    /// Build actions of the ASTs the analyzer reported as loaded.
    pub ctu_dependencies: Vec<ArchivedAction>,
    /// Loaded ASTs no action in this build produced.
    pub unresolved_asts: Vec<PathBuf>,
    /// Contents of the analyzed source and every resolved dependency.
    pub sources: BTreeMap<PathBuf, String>,
}

impl FailureArchive {
    /// Gathers the archive for `rh`, resolving loaded ASTs through `actions`.
    #[must_use]
    pub fn collect(
        action: &CompilationAction,
        rh: &ResultHandler,
        failure: FailureKind,
        toolchain: Option<String>,
        actions: &ActionMap,
    ) -> Self {
        let mut ctu_dependencies = Vec::new();
        let mut unresolved_asts = Vec::new();
        let mut sources = BTreeMap::new();
        read_source(&action.absolute_source(), &mut sources);

        let output = format!("{}\n{}", rh.analyzer_stdout, rh.analyzer_stderr);
        for ast in loaded_asts(&output, &action.directory) {
            match source_of_ast(&ast).and_then(|src| actions.get(&src)) {
                Some(dep) => {
                    read_source(&dep.absolute_source(), &mut sources);
                    ctu_dependencies.push(ArchivedAction::from(dep));
                }
                None => unresolved_asts.push(ast),
            }
        }

        Self {
            analyzer: rh.analyzer_type,
            failure,
            ctu: rh.ctu_enabled,
            build_action: ArchivedAction::from(action),
            analyzer_command: rh.analyzer_cmd.clone(),
            return_code: rh.analyzer_returncode,
            stdout: rh.analyzer_stdout.clone(),
            stderr: rh.analyzer_stderr.clone(),
            toolchain,
            ctu_dependencies,
            unresolved_asts,
            sources,
        }
    }

    /// Writes the archive as `<dir>/<name>` and returns the path.
    ///
    /// # Errors
    /// Returns error if the directory or file cannot be written.
    pub fn write(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        fs::create_dir_all(dir).at_path(dir)?;
        let path = dir.join(name);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).at_path(&path)?;
        Ok(path)
    }
}

/// `<base>[_ctu]<suffix>.json`
#[must_use]
pub fn archive_name(base: &str, ctu: bool, kind: FailureKind) -> String {
    let marker = if ctu { CTU_MARKER } else { "" };
    format!("{base}{marker}{}.json", kind.archive_suffix())
}

/// Every archive name a result with this base and CTU mode could have left behind.
#[must_use]
pub fn archive_names(base: &str, ctu: bool) -> Vec<String> {
    FailureKind::ALL
        .iter()
        .map(|kind| archive_name(base, ctu, *kind))
        .collect()
}

/// AST paths from `CTU loaded AST file:` lines, resolved against `directory`.
#[must_use]
pub fn loaded_asts(output: &str, directory: &Path) -> Vec<PathBuf> {
    let mut seen = Vec::new();
    for caps in LOADED_AST_RE.captures_iter(output) {
        let path = directory.join(&caps[1]);
        if !seen.contains(&path) {
            seen.push(path);
        }
    }
    seen
}

fn read_source(path: &Path, sources: &mut BTreeMap<PathBuf, String>) {
    if sources.contains_key(path) {
        return;
    }
    match fs::read_to_string(path) {
        Ok(text) => {
            sources.insert(path.to_path_buf(), text);
        }
        Err(e) => tracing::debug!(path = %path.display(), "source not archived: {e}"),
    }
}
