//! Turns raw collector output into analyzer metadata files.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use walkdir::WalkDir;

use crate::error::{IoResultExt, Result};

pub const SPECIAL_RETURN_FILE: &str = "SpecialReturn.yaml";
pub const UNCHECKED_RETURN_FILE: &str = "UncheckedReturn.yaml";

static STAT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"warning: (Special Return Value|Return Value Check): [^,]*,([^,]+),([01])")
        .unwrap_or_else(|_| panic!("Invalid Regex"))
});

/// Sample counts for one function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Samples {
    total: usize,
    positive: usize,
}

impl Samples {
    fn record(&mut self, flag: bool) {
        self.total += 1;
        if flag {
            self.positive += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn is_relevant(self, min_sample_count: usize, threshold: f64) -> bool {
        self.total >= min_sample_count
            && self.total > 0
            && (self.positive as f64 / self.total as f64) >= threshold
    }
}

/// Per-function samples gathered from every `.stat` file.
#[derive(Debug, Clone, Default)]
pub struct ReturnValueStats {
    special_return: BTreeMap<String, Samples>,
    return_check: BTreeMap<String, Samples>,
}

/// Functions written to the metadata files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsReport {
    pub special_return: Vec<String>,
    pub unchecked_return: Vec<String>,
}

impl ReturnValueStats {
    /// Feeds one collector output.
    pub fn ingest(&mut self, text: &str) {
        for caps in STAT_LINE_RE.captures_iter(text) {
            let function = caps[2].trim().to_string();
            let flag = &caps[3] == "1";
            let bucket = if &caps[1] == "Special Return Value" {
                &mut self.special_return
            } else {
                &mut self.return_check
            };
            bucket.entry(function).or_default().record(flag);
        }
    }

    /// Functions passing both the sample-count and relevance thresholds.
    #[must_use]
    pub fn relevant(&self, min_sample_count: usize, threshold: f64) -> StatsReport {
        let select = |map: &BTreeMap<String, Samples>| {
            map.iter()
                .filter(|(_, s)| s.is_relevant(min_sample_count, threshold))
                .map(|(name, _)| name.clone())
                .collect()
        };
        StatsReport {
            special_return: select(&self.special_return),
            unchecked_return: select(&self.return_check),
        }
    }
}

/// Reads every file in `raw_dir` and writes the metadata files into `out_dir`.
///
/// # Errors
/// Returns error if a raw file cannot be read or an output file cannot be written.
pub fn postprocess_stats(
    raw_dir: &Path,
    out_dir: &Path,
    min_sample_count: usize,
    threshold: f64,
) -> Result<StatsReport> {
    let mut stats = ReturnValueStats::default();
    if raw_dir.is_dir() {
        for entry in WalkDir::new(raw_dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let text = fs::read_to_string(entry.path()).at_path(entry.path())?;
                stats.ingest(&text);
            }
        }
    }

    let report = stats.relevant(min_sample_count, threshold);
    fs::create_dir_all(out_dir).at_path(out_dir)?;

    let mut special = String::from("#\n# SpecialReturn metadata format 1.0\n");
    for name in &report.special_return {
        let _ = writeln!(special, "{{name: {name}, relation: EQ, value: 0}}");
    }
    let special_path = out_dir.join(SPECIAL_RETURN_FILE);
    fs::write(&special_path, special).at_path(&special_path)?;

    let mut unchecked = String::from("#\n# UncheckedReturn metadata format 1.0\n");
    for name in &report.unchecked_return {
        let _ = writeln!(unchecked, "- {name}");
    }
    let unchecked_path = out_dir.join(UNCHECKED_RETURN_FILE);
    fs::write(&unchecked_path, unchecked).at_path(&unchecked_path)?;

    tracing::info!(
        special = report.special_return.len(),
        unchecked = report.unchecked_return.len(),
        "statistics written to {}",
        out_dir.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(kind: &str, func: &str, flag: u8) -> String {
        format!("/s/a.c:1:1: warning: {kind}: /s/a.c:1:1,{func},{flag}\n")
    }

    #[test]
    fn threshold_and_sample_count() {
        let mut stats = ReturnValueStats::default();
        let mut text = String::new();
        for i in 0..10 {
            text.push_str(&line("Return Value Check", "malloc", u8::from(i != 0)));
            text.push_str(&line("Return Value Check", "printf", 0));
        }
        text.push_str(&line("Special Return Value", "fopen", 1));
        stats.ingest(&text);

        let report = stats.relevant(10, 0.85);
        assert_eq!(report.unchecked_return, vec!["malloc".to_string()]);
        assert!(report.special_return.is_empty(), "fopen has too few samples");

        let lenient = stats.relevant(1, 0.85);
        assert_eq!(lenient.special_return, vec!["fopen".to_string()]);
    }

    #[test]
    fn writes_metadata_files() {
        let raw = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(raw.path().join("a.c_1.stat"), line("Special Return Value", "fopen", 1)).unwrap();

        let report = postprocess_stats(raw.path(), out.path(), 1, 0.5).unwrap();
        assert_eq!(report.special_return, vec!["fopen".to_string()]);

        let special = fs::read_to_string(out.path().join(SPECIAL_RETURN_FILE)).unwrap();
        assert!(special.contains("{name: fopen, relation: EQ, value: 0}"));
        let unchecked = fs::read_to_string(out.path().join(UNCHECKED_RETURN_FILE)).unwrap();
        assert!(unchecked.starts_with("#\n# UncheckedReturn"));
    }
}
