//! Analyzer drivers.
//!
//! Each analyzer type knows how to build its command line, where its artifact
//! goes, how to classify its exit, and what post-processing its output needs.
//! The pipeline only talks to the [`AnalyzerDriver`] trait.

mod clang_tidy;
mod clangsa;

pub use clang_tidy::ClangTidy;
pub use clangsa::ClangSa;

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::types::{AnalyzerType, CompilationAction, FailureKind, ResultHandler};

/// Per-analyzer behavior used by the analysis worker.
pub trait AnalyzerDriver: Send + Sync {
    fn analyzer_type(&self) -> AnalyzerType;

    /// Extension of the artifact this analyzer produces.
    fn artifact_extension(&self) -> &'static str {
        "plist"
    }

    /// Fresh result record with the final artifact path filled in.
    fn construct_result_handler(&self, action: &CompilationAction, output_dir: &Path) -> ResultHandler {
        let name = result_file_name(action, self.analyzer_type(), self.artifact_extension());
        ResultHandler::new(self.analyzer_type(), output_dir.join(name), action.absolute_source())
    }

    /// Full argv for one invocation writing to `rh.raw_output_file`.
    /// `ctu_dir` is set only when CTU is on for this attempt.
    ///
    /// # Errors
    /// Returns error if the command cannot be constructed (e.g. unknown target).
    fn construct_command(
        &self,
        action: &CompilationAction,
        rh: &ResultHandler,
        ctu_dir: Option<&Path>,
    ) -> Result<Vec<String>>;

    /// `None` for success.
    fn classify(&self, rh: &ResultHandler) -> Option<FailureKind> {
        rh.failure_kind()
    }

    /// Produces the raw output file for analyzers that only print to stdout.
    ///
    /// # Errors
    /// Returns error if the raw output cannot be written.
    fn materialize_output(&self, _rh: &ResultHandler) -> Result<()> {
        Ok(())
    }

    /// Rewrites a persisted artifact in place.
    ///
    /// # Errors
    /// Returns error if the artifact cannot be rewritten.
    fn postprocess(&self, _artifact: &Path) -> Result<()> {
        Ok(())
    }

    /// Files the artifact reports on.
    ///
    /// # Errors
    /// Returns error if the artifact cannot be read.
    fn referenced_files(&self, _artifact: &Path) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// Compiler resource directory or similar, archived with failures.
    fn toolchain_info(&self) -> Option<String> {
        None
    }

    /// Whether this analyzer can run with CTU context at all.
    fn supports_ctu(&self) -> bool {
        false
    }

    /// Version string reported by the analyzer binary.
    fn version(&self) -> Option<String> {
        None
    }
}

/// Drivers keyed by analyzer type.
#[derive(Clone, Default)]
pub struct Analyzers {
    drivers: BTreeMap<AnalyzerType, Arc<dyn AnalyzerDriver>>,
}

impl Analyzers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in drivers configured from `[tools]`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut analyzers = Self::new();
        let stats_dir = config.statistics.enabled.then(|| config.stats_dir());
        analyzers.register(Arc::new(ClangSa::new(
            &config.tools.clang,
            &config.tools.func_map_cmd,
            stats_dir,
        )));
        analyzers.register(Arc::new(ClangTidy::new(&config.tools.clang_tidy)));
        analyzers
    }

    /// Adds or replaces the driver for its analyzer type.
    pub fn register(&mut self, driver: Arc<dyn AnalyzerDriver>) {
        self.drivers.insert(driver.analyzer_type(), driver);
    }

    #[must_use]
    pub fn get(&self, analyzer: AnalyzerType) -> Option<&dyn AnalyzerDriver> {
        self.drivers.get(&analyzer).map(AsRef::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AnalyzerType, &dyn AnalyzerDriver)> {
        self.drivers.iter().map(|(k, v)| (*k, v.as_ref()))
    }
}

/// `<source file name>_<analyzer>_<identity hash>.<ext>`
///
/// The hash covers the action key and the original command, so the name is
/// deterministic and unique per action identity.
#[must_use]
pub fn result_file_name(action: &CompilationAction, analyzer: AnalyzerType, ext: &str) -> String {
    let key = action.key();
    let mut hasher = Sha256::new();
    hasher.update(key.source.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(key.target.as_bytes());
    hasher.update([0u8]);
    hasher.update(action.original_command.as_bytes());
    let digest = hasher.finalize();
    let short: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{}_{}_{short}.{ext}", action.source_file_name(), analyzer.name())
}

/// Resolves `program` the way a shell would: paths as-is, bare names via `PATH`.
#[must_use]
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_name_is_deterministic_and_target_sensitive() {
        let mut a = CompilationAction::new("/src/main.c", "/src", AnalyzerType::ClangSa);
        let first = result_file_name(&a, AnalyzerType::ClangSa, "plist");
        assert_eq!(first, result_file_name(&a, AnalyzerType::ClangSa, "plist"));
        assert!(first.starts_with("main.c_clangsa_"));
        assert!(first.ends_with(".plist"));

        a.target = "aarch64-linux-gnu".into();
        assert_ne!(first, result_file_name(&a, AnalyzerType::ClangSa, "plist"));
    }

    #[cfg(unix)]
    #[test]
    fn finds_sh_on_path() {
        assert!(find_executable("sh").is_some());
        assert!(find_executable("definitely_not_a_binary_xyz").is_none());
    }

    #[test]
    fn registry_replaces_by_type() {
        let config = Config::new("/out");
        let mut analyzers = Analyzers::from_config(&config);
        assert!(analyzers.get(AnalyzerType::ClangSa).is_some());
        analyzers.register(Arc::new(ClangTidy::new("other-tidy")));
        assert_eq!(analyzers.iter().count(), 2);
    }
}
