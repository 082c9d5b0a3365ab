//! Clang-Tidy driver. The tool prints diagnostics to stdout; the driver
//! writes them to the raw output file itself.

use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, OnceLock};

use crate::error::{IoResultExt, Result};
use crate::process::ProcessRunner;
use crate::types::{AnalyzerType, CompilationAction, ResultHandler};

use super::AnalyzerDriver;

static DIAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(.+?):\d+:\d+: (?:warning|error|note):")
        .unwrap_or_else(|_| panic!("Invalid Regex"))
});

pub struct ClangTidy {
    clang_tidy: String,
    version: OnceLock<Option<String>>,
}

impl ClangTidy {
    #[must_use]
    pub fn new(clang_tidy: &str) -> Self {
        Self {
            clang_tidy: clang_tidy.to_string(),
            version: OnceLock::new(),
        }
    }
}

impl AnalyzerDriver for ClangTidy {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::ClangTidy
    }

    fn artifact_extension(&self) -> &'static str {
        "txt"
    }

    fn construct_command(
        &self,
        action: &CompilationAction,
        _rh: &ResultHandler,
        _ctu_dir: Option<&Path>,
    ) -> Result<Vec<String>> {
        let mut cmd = vec![
            self.clang_tidy.clone(),
            action.absolute_source().to_string_lossy().into_owned(),
            "--".to_string(),
            "-x".to_string(),
            action.language.clone(),
        ];
        cmd.extend(action.compile_flags());
        Ok(cmd)
    }

    fn materialize_output(&self, rh: &ResultHandler) -> Result<()> {
        let path = &rh.raw_output_file;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).at_path(parent)?;
        }
        fs::write(path, &rh.analyzer_stdout).at_path(path)
    }

    fn referenced_files(&self, artifact: &Path) -> Result<Vec<PathBuf>> {
        let text = fs::read_to_string(artifact).at_path(artifact)?;
        Ok(diagnostic_files(&text))
    }

    fn version(&self) -> Option<String> {
        self.version
            .get_or_init(|| {
                let cmd = vec![self.clang_tidy.clone(), "--version".to_string()];
                let result = ProcessRunner::new().run_simple(&cmd, Path::new("."));
                result
                    .passed()
                    .then(|| result.stdout().lines().map(str::trim).find(|l| l.contains("version")))
                    .flatten()
                    .map(str::to_string)
            })
            .clone()
    }
}

/// Distinct files named by `path:line:col: severity:` diagnostics.
fn diagnostic_files(output: &str) -> Vec<PathBuf> {
    DIAG_RE
        .captures_iter(output)
        .map(|c| PathBuf::from(c[1].trim()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
