// src/config/mod.rs
pub mod types;

pub use self::types::{
    AnalysisConfig, Config, CtuConfig, CtupipeToml, SkipConfig, StatisticsConfig, ToolsConfig,
};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PipelineError, Result};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "ctupipe.toml";

impl Config {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.output_dir = output_dir.into();
        config
    }

    /// Loads `path` (or `ctupipe.toml` if present) on top of the defaults.
    ///
    /// # Errors
    /// Returns error if an explicitly named file is missing, or any file fails to parse.
    pub fn load(output_dir: impl Into<PathBuf>, path: Option<&Path>) -> Result<Self> {
        let mut config = Self::new(output_dir);
        match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| PipelineError::io(e, p))?;
                config.apply_toml(&content)?;
            }
            None => {
                if let Ok(content) = fs::read_to_string(CONFIG_FILE) {
                    config.apply_toml(&content)?;
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Replaces the file-backed sections with the parsed `content`.
    ///
    /// # Errors
    /// Returns error if `content` is not valid TOML for [`CtupipeToml`].
    pub fn apply_toml(&mut self, content: &str) -> Result<()> {
        let parsed: CtupipeToml = toml::from_str(content)?;
        self.analysis = parsed.analysis;
        self.ctu = parsed.ctu;
        self.statistics = parsed.statistics;
        self.tools = parsed.tools;
        self.skip = parsed.skip;
        Ok(())
    }

    /// Validates configuration.
    ///
    /// # Errors
    /// Returns error for values no run can work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.statistics.relevance_threshold) {
            return Err(PipelineError::Config(format!(
                "statistics.relevance_threshold must be within [0, 1], got {}",
                self.statistics.relevance_threshold
            )));
        }
        if self.tools.clang.trim().is_empty() {
            return Err(PipelineError::Config("tools.clang must not be empty".into()));
        }
        Ok(())
    }

    /// CTU root; relative paths live under the output directory.
    #[must_use]
    pub fn ctu_dir(&self) -> PathBuf {
        self.resolve(&self.ctu.dir)
    }

    /// Statistics root; relative paths live under the output directory.
    #[must_use]
    pub fn stats_dir(&self) -> PathBuf {
        self.resolve(&self.statistics.dir)
    }

    /// Per-unit timeout, if one is configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.analysis.timeout > 0).then(|| Duration::from_secs(self.analysis.timeout))
    }

    /// Whether any pre-analysis pass has work to do.
    #[must_use]
    pub fn needs_pre_analysis(&self) -> bool {
        self.ctu.enabled || self.statistics.enabled
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_dir.join(path)
        }
    }
}
