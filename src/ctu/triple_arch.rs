//! Target architecture detection through the compiler driver's explain mode.

use regex::Regex;
use std::sync::LazyLock;

use crate::process::ProcessRunner;
use crate::types::{CommandResult, CompilationAction};

static TRIPLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""-triple"\s+"([^"]+)""#).unwrap_or_else(|_| panic!("Invalid Regex"))
});

/// Extracts the architecture segment of the `-triple` argument from `-###` output.
#[must_use]
pub fn parse_triple_arch(output: &str) -> Option<String> {
    TRIPLE_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|triple| triple.as_str().split('-').next())
        .filter(|arch| !arch.is_empty())
        .map(str::to_string)
}

/// Runs `<clang> -### -c -x <lang> <flags> <source>` and returns the target architecture.
///
/// # Errors
/// Returns the command result when the driver fails or prints no `-triple`.
pub fn get_triple_arch(
    runner: &ProcessRunner,
    clang: &str,
    action: &CompilationAction,
) -> Result<String, CommandResult> {
    let mut cmd = vec![
        clang.to_string(),
        "-###".to_string(),
        "-c".to_string(),
        "-x".to_string(),
        action.language.clone(),
    ];
    cmd.extend(action.compile_flags());
    cmd.push(action.absolute_source().to_string_lossy().into_owned());

    let result = runner.run_simple(&cmd, &action.directory);
    if !result.passed() {
        return Err(result);
    }
    // The driver prints the jobs it would run on stderr.
    parse_triple_arch(&result.output()).ok_or(result)
}
