//! Skip-list evaluation.
//!
//! A skip file holds one `+pattern` (include) or `-pattern` (skip) per line.
//! Patterns are globs where `*` matches any run of characters, including `/`.
//! The first matching line decides; unmatched paths are analyzed.

use regex::Regex;
use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Decides whether a file is excluded from analysis.
pub trait SkipList: Send + Sync {
    fn should_skip(&self, path: &Path) -> bool;
}

/// Skips nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSkip;

impl SkipList for NoSkip {
    fn should_skip(&self, _path: &Path) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
struct SkipRule {
    skip: bool,
    pattern: Regex,
}

/// Skip list parsed from `+`/`-` glob lines.
#[derive(Debug, Clone, Default)]
pub struct SkipHandler {
    rules: Vec<SkipRule>,
}

impl SkipHandler {
    /// Parses skip file content.
    ///
    /// # Errors
    /// Returns error on a non-empty line that starts with neither `+` nor `-`.
    pub fn parse(content: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (skip, glob) = if let Some(rest) = line.strip_prefix('-') {
                (true, rest.trim())
            } else if let Some(rest) = line.strip_prefix('+') {
                (false, rest.trim())
            } else {
                return Err(PipelineError::Config(format!(
                    "skip file line {}: expected '+' or '-' prefix: {line}",
                    idx + 1
                )));
            };
            rules.push(SkipRule {
                skip,
                pattern: glob_to_regex(glob)?,
            });
        }
        Ok(Self { rules })
    }

    /// Reads and parses a skip file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PipelineError::io(e, path))?;
        Self::parse(&content)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl SkipList for SkipHandler {
    fn should_skip(&self, path: &Path) -> bool {
        let normalized = path.to_string_lossy().replace('\\', "/");
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(&normalized))
            .is_some_and(|rule| rule.skip)
    }
}

fn glob_to_regex(glob: &str) -> Result<Regex> {
    let escaped = regex::escape(glob).replace(r"\*", ".*");
    Ok(Regex::new(&format!("^{escaped}$"))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins() {
        let handler = SkipHandler::parse("+/src/keep/*\n-/src/*\n").unwrap();
        assert!(!handler.should_skip(Path::new("/src/keep/a.c")));
        assert!(handler.should_skip(Path::new("/src/other/b.c")));
        assert!(!handler.should_skip(Path::new("/lib/c.c")));
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let handler = SkipHandler::parse("# header\n\n-*.h\n").unwrap();
        assert!(handler.should_skip(Path::new("/inc/x.h")));
        assert!(!handler.should_skip(Path::new("/inc/x.c")));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let handler = SkipHandler::parse("-/a+b/(x).c").unwrap();
        assert!(handler.should_skip(Path::new("/a+b/(x).c")));
        assert!(!handler.should_skip(Path::new("/aab/x.c")));
    }

    #[test]
    fn bad_prefix_is_error() {
        assert!(SkipHandler::parse("/src/*").is_err());
    }

    #[test]
    fn no_skip_never_skips() {
        assert!(!NoSkip.should_skip(Path::new("/anything")));
    }
}
