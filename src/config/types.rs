use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::process::KillSignal;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    /// Seconds; 0 disables the timeout watcher.
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub kill_signal: KillSignal,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            timeout: 0,
            kill_signal: KillSignal::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtuConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ctu_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub reanalyze_on_failure: bool,
    #[serde(default = "default_true")]
    pub clean_before_collect: bool,
}

impl Default for CtuConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_ctu_dir(),
            reanalyze_on_failure: false,
            clean_before_collect: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_stats_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_min_sample_count")]
    pub min_sample_count: usize,
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_stats_dir(),
            min_sample_count: default_min_sample_count(),
            relevance_threshold: default_relevance_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_clang")]
    pub clang: String,
    #[serde(default = "default_clang_tidy")]
    pub clang_tidy: String,
    #[serde(default = "default_func_map_cmd")]
    pub func_map_cmd: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            clang: default_clang(),
            clang_tidy: default_clang_tidy(),
            func_map_cmd: default_func_map_cmd(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkipConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// On-disk shape of `ctupipe.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CtupipeToml {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub ctu: CtuConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub skip: SkipConfig,
}

/// Effective configuration of one run: file values, CLI overrides, output root.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub output_dir: PathBuf,
    pub verbose: bool,
    pub analysis: AnalysisConfig,
    pub ctu: CtuConfig,
    pub statistics: StatisticsConfig,
    pub tools: ToolsConfig,
    pub skip: SkipConfig,
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}
fn default_ctu_dir() -> PathBuf { PathBuf::from("ctu-dir") }
fn default_stats_dir() -> PathBuf { PathBuf::from("stats") }
fn default_clang() -> String { "clang".to_string() }
fn default_clang_tidy() -> String { "clang-tidy".to_string() }
fn default_func_map_cmd() -> String { "clang-extdef-mapping".to_string() }
const fn default_true() -> bool { true }
const fn default_min_sample_count() -> usize { 10 }
const fn default_relevance_threshold() -> f64 { 0.85 }
