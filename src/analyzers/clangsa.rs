//! Clang Static Analyzer driver.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, OnceLock};

use crate::ctu::get_triple_arch;
use crate::error::{IoResultExt, PipelineError, Result};
use crate::process::ProcessRunner;
use crate::types::{AnalyzerType, CompilationAction, ResultHandler};

use super::{find_executable, AnalyzerDriver};

/// Matches the `files` array of a plist-multi-file report.
static FILES_ARRAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<key>files</key>\s*<array>(.*?)</array>")
        .unwrap_or_else(|_| panic!("Invalid Regex"))
});

static PLIST_STRING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<string>([^<]*)</string>").unwrap_or_else(|_| panic!("Invalid Regex"))
});

pub struct ClangSa {
    clang: String,
    func_map_cmd: String,
    stats_dir: Option<PathBuf>,
    runner: ProcessRunner,
    version: OnceLock<Option<String>>,
    resource_dir: OnceLock<Option<String>>,
}

impl ClangSa {
    #[must_use]
    pub fn new(clang: &str, func_map_cmd: &str, stats_dir: Option<PathBuf>) -> Self {
        Self {
            clang: clang.to_string(),
            func_map_cmd: func_map_cmd.to_string(),
            stats_dir,
            runner: ProcessRunner::new(),
            version: OnceLock::new(),
            resource_dir: OnceLock::new(),
        }
    }

    fn ctu_flags(&self, action: &CompilationAction, ctu_dir: &Path) -> Result<Vec<String>> {
        let arch = get_triple_arch(&self.runner, &self.clang, action).map_err(|r| {
            PipelineError::Other(format!(
                "cannot determine target architecture of {}: {}",
                action.absolute_source().display(),
                r.stderr().trim()
            ))
        })?;
        let mut flags = Vec::new();
        for config in [
            "experimental-enable-naive-ctu-analysis=true".to_string(),
            format!("ctu-dir={}", ctu_dir.join(arch).display()),
            "display-ctu-progress=true".to_string(),
        ] {
            flags.extend(analyzer_config(config));
        }
        Ok(flags)
    }

    fn query(&self, arg: &str) -> Option<String> {
        let cmd = vec![self.clang.clone(), arg.to_string()];
        let result = self.runner.run_simple(&cmd, Path::new("."));
        if !result.passed() {
            return None;
        }
        result
            .stdout()
            .lines()
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
    }
}

fn analyzer_config(option: String) -> [String; 4] {
    [
        "-Xclang".to_string(),
        "-analyzer-config".to_string(),
        "-Xclang".to_string(),
        option,
    ]
}

impl AnalyzerDriver for ClangSa {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::ClangSa
    }

    fn construct_command(
        &self,
        action: &CompilationAction,
        rh: &ResultHandler,
        ctu_dir: Option<&Path>,
    ) -> Result<Vec<String>> {
        let mut cmd = vec![
            self.clang.clone(),
            "--analyze".to_string(),
            "-Qunused-arguments".to_string(),
            "--analyzer-output".to_string(),
            "plist-multi-file".to_string(),
            "-o".to_string(),
            rh.raw_output_file.to_string_lossy().into_owned(),
        ];
        if let Some(dir) = ctu_dir {
            cmd.extend(self.ctu_flags(action, dir)?);
        }
        if let Some(stats) = &self.stats_dir {
            cmd.extend(analyzer_config(format!("api-metadata-path={}", stats.display())));
        }
        cmd.push("-x".to_string());
        cmd.push(action.language.clone());
        cmd.extend(action.compile_flags());
        cmd.push(action.absolute_source().to_string_lossy().into_owned());
        Ok(cmd)
    }

    fn referenced_files(&self, artifact: &Path) -> Result<Vec<PathBuf>> {
        let text = fs::read_to_string(artifact).at_path(artifact)?;
        Ok(plist_files(&text))
    }

    fn toolchain_info(&self) -> Option<String> {
        self.resource_dir
            .get_or_init(|| self.query("-print-resource-dir"))
            .clone()
    }

    fn supports_ctu(&self) -> bool {
        find_executable(&self.func_map_cmd).is_some()
    }

    fn version(&self) -> Option<String> {
        self.version.get_or_init(|| self.query("--version")).clone()
    }
}

/// File paths listed in the report's `files` array.
#[must_use]
pub fn plist_files(plist: &str) -> Vec<PathBuf> {
    let Some(array) = FILES_ARRAY_RE.captures(plist).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    PLIST_STRING_RE
        .captures_iter(array.as_str())
        .map(|c| PathBuf::from(&c[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> ResultHandler {
        ResultHandler::new(
            AnalyzerType::ClangSa,
            PathBuf::from("/out/a.c_clangsa_00.plist"),
            PathBuf::from("/src/a.c"),
        )
    }

    #[test]
    fn command_without_ctu() {
        let driver = ClangSa::new("clang", "clang-extdef-mapping", None);
        let mut action = CompilationAction::new("/src/a.c", "/src", AnalyzerType::ClangSa);
        action.analyzer_options = vec!["-DX".into()];
        let cmd = driver.construct_command(&action, &handler(), None).unwrap();
        assert_eq!(cmd[0], "clang");
        assert!(cmd.contains(&"--analyze".to_string()));
        assert!(cmd.contains(&"/out/a.c_clangsa_00.plist".to_string()));
        assert!(!cmd.iter().any(|a| a.contains("ctu")));
        assert_eq!(cmd.last().map(String::as_str), Some("/src/a.c"));
        assert!(cmd.contains(&"-DX".to_string()));
    }

    #[test]
    fn statistics_metadata_path() {
        let driver = ClangSa::new("clang", "x", Some(PathBuf::from("/out/stats")));
        let action = CompilationAction::new("/src/a.c", "/src", AnalyzerType::ClangSa);
        let cmd = driver.construct_command(&action, &handler(), None).unwrap();
        assert!(cmd.contains(&"api-metadata-path=/out/stats".to_string()));
    }

    #[test]
    fn ctu_without_working_compiler_is_an_error() {
        let driver = ClangSa::new("nonexistent_clang_xyz", "x", None);
        let action = CompilationAction::new("/src/a.c", "/src", AnalyzerType::ClangSa);
        let err = driver.construct_command(&action, &handler(), Some(Path::new("/ctu")));
        assert!(err.is_err());
    }

    #[test]
    fn reads_plist_files_array() {
        let plist = r"<plist><dict>
 <key>diagnostics</key><array></array>
 <key>files</key>
 <array>
  <string>/src/a.c</string>
  <string>/src/include/b.h</string>
 </array>
</dict></plist>";
        assert_eq!(
            plist_files(plist),
            vec![PathBuf::from("/src/a.c"), PathBuf::from("/src/include/b.h")]
        );
        assert!(plist_files("<plist/>").is_empty());
    }
}
