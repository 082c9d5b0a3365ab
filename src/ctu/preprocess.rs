//! Per-TU CTU preprocessing: AST dump and function-map fragment.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::process::ProcessRunner;
use crate::types::{CommandResult, CompilationAction};

use super::{ast_path, ast_relative_path, triple_arch, TEMP_FNMAP_FOLDER};

/// Step of the preprocessing that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepStage {
    TripleArch,
    EmitAst,
    FunctionMap,
    WriteFragment,
}

impl fmt::Display for PrepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TripleArch => "target triple detection",
            Self::EmitAst => "AST emission",
            Self::FunctionMap => "function map generation",
            Self::WriteFragment => "function map fragment write",
        };
        f.write_str(label)
    }
}

/// Result of preprocessing one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtuPrepOutcome {
    Prepared { arch: String, fragment: Option<PathBuf> },
    /// The TU does not take part in CTU; never fatal to the pass.
    Failed { stage: PrepStage },
}

/// Emits the AST dump and function-map fragment for single actions.
#[derive(Debug, Clone)]
pub struct CtuPreprocessor<'a> {
    runner: &'a ProcessRunner,
    clang: &'a str,
    func_map_cmd: &'a str,
    ctu_dir: &'a Path,
}

impl<'a> CtuPreprocessor<'a> {
    #[must_use]
    pub fn new(runner: &'a ProcessRunner, clang: &'a str, func_map_cmd: &'a str, ctu_dir: &'a Path) -> Self {
        Self {
            runner,
            clang,
            func_map_cmd,
            ctu_dir,
        }
    }

    /// Runs both sub-operations for `action`.
    ///
    /// The architecture is detected once and shared by both steps; a failed
    /// AST emission skips the map so the map never names a missing AST.
    #[must_use]
    pub fn prepare(&self, action: &CompilationAction) -> CtuPrepOutcome {
        let arch = match triple_arch::get_triple_arch(self.runner, self.clang, action) {
            Ok(arch) => arch,
            Err(result) => {
                log_failure(PrepStage::TripleArch, action, &result);
                return CtuPrepOutcome::Failed {
                    stage: PrepStage::TripleArch,
                };
            }
        };

        if let Err(stage) = self.emit_ast(action, &arch) {
            return CtuPrepOutcome::Failed { stage };
        }

        match self.emit_function_map(action, &arch) {
            Ok(fragment) => CtuPrepOutcome::Prepared { arch, fragment },
            Err(stage) => CtuPrepOutcome::Failed { stage },
        }
    }

    /// `<clang> -c -x <lang> <flags> -emit-ast -D__clang_analyzer__ -w -o <ast> <source>`
    fn emit_ast(&self, action: &CompilationAction, arch: &str) -> Result<PathBuf, PrepStage> {
        let source = action.absolute_source();
        let ast = ast_path(self.ctu_dir, arch, &source);

        if let Some(parent) = ast.parent() {
            // A sibling worker may have created it already; create_dir_all tolerates that.
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(dir = %parent.display(), "cannot create AST directory: {e}");
                return Err(PrepStage::EmitAst);
            }
        }

        let mut cmd = vec![
            self.clang.to_string(),
            "-c".to_string(),
            "-x".to_string(),
            action.language.clone(),
        ];
        cmd.extend(action.compile_flags());
        cmd.extend([
            "-emit-ast".to_string(),
            "-D__clang_analyzer__".to_string(),
            "-w".to_string(),
            "-o".to_string(),
            ast.to_string_lossy().into_owned(),
            source.to_string_lossy().into_owned(),
        ]);

        let result = self.runner.run_simple(&cmd, &action.directory);
        if result.passed() {
            Ok(ast)
        } else {
            log_failure(PrepStage::EmitAst, action, &result);
            Err(PrepStage::EmitAst)
        }
    }

    /// `<func_map_cmd> <source> -- <flags>`, stdout rewritten into a private fragment file.
    fn emit_function_map(
        &self,
        action: &CompilationAction,
        arch: &str,
    ) -> Result<Option<PathBuf>, PrepStage> {
        let source = action.absolute_source();
        let mut cmd = vec![
            self.func_map_cmd.to_string(),
            source.to_string_lossy().into_owned(),
            "--".to_string(),
            "-x".to_string(),
            action.language.clone(),
        ];
        cmd.extend(action.compile_flags());

        let result = self.runner.run_simple(&cmd, &action.directory);
        if !result.passed() {
            log_failure(PrepStage::FunctionMap, action, &result);
            return Err(PrepStage::FunctionMap);
        }

        let lines = transform_function_map(result.stdout());
        if lines.is_empty() {
            return Ok(None);
        }

        let dir = self.ctu_dir.join(arch).join(TEMP_FNMAP_FOLDER);
        write_fragment(&dir, &lines).map(Some).map_err(|e| {
            tracing::warn!(
                source = %source.display(),
                dir = %dir.display(),
                "cannot write function map fragment: {e}"
            );
            PrepStage::WriteFragment
        })
    }
}

/// Rewrites collector output `name path` lines into `name ast/<path>.ast`.
/// Lines without a separating space are dropped.
#[must_use]
pub fn transform_function_map(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let (name, path) = line.trim_end_matches('\r').split_once(' ')?;
            if name.is_empty() || path.is_empty() {
                return None;
            }
            Some(format!("{name} {}", ast_relative_path(path)))
        })
        .collect()
}

/// Writes `lines` to a new, uniquely named file in `dir`; never appends to a shared file.
fn write_fragment(dir: &Path, lines: &[String]) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let mut file = tempfile::Builder::new()
        .prefix("fnmap-")
        .suffix(".txt")
        .tempfile_in(dir)?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

fn log_failure(stage: PrepStage, action: &CompilationAction, result: &CommandResult) {
    tracing::warn!(
        source = %action.absolute_source().display(),
        exit_code = result.exit_code(),
        "CTU {stage} failed: {}\n{}",
        result.command(),
        result.stderr()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_rewrites_paths() {
        let out = "c:@F@foo /src/a.c\nc:@F@bar /src/b.c\r\n";
        assert_eq!(
            transform_function_map(out),
            vec!["c:@F@foo ast/src/a.c.ast", "c:@F@bar ast/src/b.c.ast"]
        );
    }

    #[test]
    fn transform_splits_on_first_space_only() {
        let out = "_Z3foov /src/dir with space/a.c";
        assert_eq!(
            transform_function_map(out),
            vec!["_Z3foov ast/src/dir with space/a.c.ast"]
        );
    }

    #[test]
    fn transform_drops_malformed_lines() {
        assert!(transform_function_map("garbage\n\n").is_empty());
    }

    #[test]
    fn fragments_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_fragment(dir.path(), &["a x.ast".into()]).unwrap();
        let b = write_fragment(dir.path(), &["a x.ast".into()]).unwrap();
        assert_ne!(a, b);
        assert_eq!(fs::read_to_string(a).unwrap(), "a x.ast\n");
    }
}
