//! Compilation actions extracted from a build.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The analyzer that runs a compilation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AnalyzerType {
    #[serde(rename = "clangsa")]
    ClangSa,
    #[serde(rename = "clang-tidy")]
    ClangTidy,
}

impl AnalyzerType {
    /// Name used in progress lines, file names and statistics keys.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ClangSa => "clangsa",
            Self::ClangTidy => "clang-tidy",
        }
    }

    /// Only the Clang Static Analyzer takes part in CTU and statistics pre-analysis.
    #[must_use]
    pub fn supports_pre_analysis(self) -> bool {
        matches!(self, Self::ClangSa)
    }
}

impl fmt::Display for AnalyzerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of an action: the same source may legitimately be built for several targets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ActionKey {
    pub source: PathBuf,
    pub target: String,
}

/// One compiler invocation extracted from a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationAction {
    pub source: PathBuf,
    pub directory: PathBuf,
    #[serde(default)]
    pub target: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub original_command: String,
    #[serde(default = "default_analyzer")]
    pub analyzer_type: AnalyzerType,
    #[serde(default)]
    pub compiler_includes: Vec<String>,
    #[serde(default)]
    pub analyzer_options: Vec<String>,
    #[serde(default)]
    pub compiler_standard: String,
}

fn default_language() -> String {
    "c".to_string()
}

fn default_analyzer() -> AnalyzerType {
    AnalyzerType::ClangSa
}

impl CompilationAction {
    /// Creates an action with empty flags, mostly useful for tests and tools.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, directory: impl Into<PathBuf>, analyzer: AnalyzerType) -> Self {
        Self {
            source: source.into(),
            directory: directory.into(),
            target: String::new(),
            language: default_language(),
            original_command: String::new(),
            analyzer_type: analyzer,
            compiler_includes: Vec::new(),
            analyzer_options: Vec::new(),
            compiler_standard: String::new(),
        }
    }

    /// The source path, resolved against the build directory if relative.
    #[must_use]
    pub fn absolute_source(&self) -> PathBuf {
        if self.source.is_absolute() {
            self.source.clone()
        } else {
            self.directory.join(&self.source)
        }
    }

    #[must_use]
    pub fn key(&self) -> ActionKey {
        ActionKey {
            source: self.absolute_source(),
            target: self.target.clone(),
        }
    }

    /// Compiler flags shared by every tool invocation for this action:
    /// options, `--target`, `-std`, then include directives.
    #[must_use]
    pub fn compile_flags(&self) -> Vec<String> {
        let mut flags = self.analyzer_options.clone();
        if !self.target.is_empty() {
            flags.push(format!("--target={}", self.target));
        }
        if !self.compiler_standard.is_empty() {
            flags.push(self.compiler_standard.clone());
        }
        flags.extend(self.compiler_includes.iter().cloned());
        flags
    }

    /// File name of the source, used to derive output names.
    #[must_use]
    pub fn source_file_name(&self) -> String {
        self.source
            .file_name()
            .map_or_else(|| "unknown".to_string(), |n| n.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_source_resolves_against_directory() {
        let action = CompilationAction::new("src/a.c", "/build", AnalyzerType::ClangSa);
        assert_eq!(action.absolute_source(), PathBuf::from("/build/src/a.c"));
    }

    #[test]
    fn key_distinguishes_targets() {
        let mut a = CompilationAction::new("/p/a.c", "/p", AnalyzerType::ClangSa);
        let mut b = a.clone();
        a.target = "x86_64-linux-gnu".into();
        b.target = "aarch64-linux-gnu".into();
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn compile_flags_order() {
        let mut action = CompilationAction::new("/p/a.c", "/p", AnalyzerType::ClangSa);
        action.analyzer_options = vec!["-DFOO".into()];
        action.target = "armv7".into();
        action.compiler_standard = "-std=c11".into();
        action.compiler_includes = vec!["-isystem".into(), "/usr/inc".into()];
        assert_eq!(
            action.compile_flags(),
            vec!["-DFOO", "--target=armv7", "-std=c11", "-isystem", "/usr/inc"]
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{"source": "a.cpp", "directory": "/b", "analyzer_type": "clang-tidy"}"#;
        let action: CompilationAction = serde_json::from_str(json).unwrap();
        assert_eq!(action.analyzer_type, AnalyzerType::ClangTidy);
        assert_eq!(action.language, "c");
        assert!(action.target.is_empty());
    }
}
