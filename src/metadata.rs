//! Run metadata handed to the storage layer as `metadata.json`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::analyzers::Analyzers;
use crate::error::{IoResultExt, Result};
use crate::types::{AnalyzerStatistics, AnalyzerStats, AnalyzerType};

pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerMetadata {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub statistics: AnalyzerStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default)]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub timestamps: Timestamps,
    #[serde(default)]
    pub analyzers: BTreeMap<String, AnalyzerMetadata>,
    /// Artifact path to the source file it was produced for.
    #[serde(default)]
    pub result_source_files: BTreeMap<PathBuf, PathBuf>,
    #[serde(default)]
    pub skipped: usize,
}

/// Seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub begin: u64,
    pub end: u64,
}

impl RunMetadata {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            timestamps: Timestamps {
                begin: now_secs(),
                end: 0,
            },
            ..Self::default()
        }
    }

    /// Queries each registered analyzer for its version once.
    pub fn record_versions<I>(&mut self, analyzers: &Analyzers, used: I)
    where
        I: IntoIterator<Item = AnalyzerType>,
    {
        for analyzer in used {
            if self.analyzers.contains_key(analyzer.name()) {
                continue;
            }
            let version = analyzers
                .get(analyzer)
                .and_then(|driver| driver.version())
                .unwrap_or_default();
            self.analyzers.entry(analyzer.name().to_string()).or_default().version = version;
        }
    }

    #[must_use]
    pub fn analyzer_version(&self, analyzer: AnalyzerType) -> String {
        self.analyzers
            .get(analyzer.name())
            .map(|m| m.version.clone())
            .unwrap_or_default()
    }

    pub fn record_statistics(&mut self, statistics: &AnalyzerStatistics) {
        for (name, stats) in statistics {
            self.analyzers.entry(name.clone()).or_default().statistics = stats.clone();
        }
    }

    pub fn finish(&mut self) {
        self.timestamps.end = now_secs();
    }

    /// Loads previously saved metadata.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).at_path(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Writes the metadata as pretty JSON.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).at_path(path)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
