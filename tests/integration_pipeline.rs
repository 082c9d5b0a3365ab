// tests/integration_pipeline.rs
//! Both passes end to end against fake compiler tools.
//!
//! Only one test lives here: it writes executable scripts, and spawning them
//! while another test forks can fail with ETXTBSY.
#![cfg(unix)]

use anyhow::Result;
use ctupipe_core::analyzers::Analyzers;
use ctupipe_core::cancel::Interrupt;
use ctupipe_core::cli::dispatch::run_pipeline;
use ctupipe_core::config::Config;
use ctupipe_core::ctu::{ast_path, read_global_map, FUNC_MAP_FILE, TEMP_FNMAP_FOLDER};
use ctupipe_core::exit::CtupipeExit;
use ctupipe_core::metadata::{RunMetadata, METADATA_FILE};
use ctupipe_core::pre_analysis::PreAnalysisState;
use ctupipe_core::skiplist::NoSkip;
use ctupipe_core::types::{AnalyzerType, CompilationAction, SchedulerState};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FAKE_CLANG: &str = r#"#!/bin/sh
case "$1" in
  --version) echo "fake clang version 1.0"; exit 0 ;;
  -print-resource-dir) echo /fake/resource; exit 0 ;;
esac
mode=analyze
out=""
prev=""
src=""
for arg in "$@"; do
  case "$arg" in
    "-###") mode=driver ;;
    -emit-ast) mode=ast ;;
    -analyzer-checker=statisticsCollector*) mode=stats ;;
  esac
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
  src="$arg"
done
case "$mode" in
  driver)
    echo ' "/usr/bin/clang" "-cc1" "-triple" "x86_64-unknown-linux-gnu" "-emit-obj"' >&2
    ;;
  ast)
    case "$src" in *broken*) echo "$src:1:1: error: expected ';'" >&2; exit 1 ;; esac
    mkdir -p "$(dirname "$out")"
    echo ast > "$out"
    ;;
  stats)
    echo "$src:3:5: warning: Special Return Value: $src:3:5,parse_int,1" >&2
    ;;
  analyze)
    case "$src" in *broken*) echo "$src:1:1: error: expected ';'" >&2; exit 1 ;; esac
    echo '<plist/>' > "$out"
    ;;
esac
exit 0
"#;

const FAKE_FUNC_MAP: &str = r#"#!/bin/sh
name=$(basename "$1" .c)
echo "c:@F@${name}_only $1"
echo "c:@F@shared $1"
"#;

fn write_script(path: &Path, body: &str) -> Result<()> {
    fs::write(path, body)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[test]
fn ctu_and_statistics_pipeline() -> Result<()> {
    let dir = TempDir::new()?;
    let bin = dir.path().join("bin");
    let src = dir.path().join("src");
    fs::create_dir_all(&bin)?;
    fs::create_dir_all(&src)?;
    let clang = bin.join("clang");
    let func_map = bin.join("clang-extdef-mapping");
    write_script(&clang, FAKE_CLANG)?;
    write_script(&func_map, FAKE_FUNC_MAP)?;

    let actions: Vec<CompilationAction> = ["a.c", "b.c", "broken.c"]
        .iter()
        .map(|name| {
            let path = src.join(name);
            fs::write(&path, "int parse_int(const char *);\n")?;
            Ok(CompilationAction::new(path, &src, AnalyzerType::ClangSa))
        })
        .collect::<Result<_>>()?;

    let mut config = Config::new(dir.path().join("out"));
    config.analysis.jobs = 2;
    config.ctu.enabled = true;
    config.statistics.enabled = true;
    config.statistics.min_sample_count = 1;
    config.tools.clang = clang.to_string_lossy().into_owned();
    config.tools.func_map_cmd = func_map.to_string_lossy().into_owned();
    let analyzers = Analyzers::from_config(&config);

    let run = run_pipeline(&config, &analyzers, &NoSkip, &Interrupt::new(), &actions)?;

    // Pre-analysis
    let pre = run.pre_analysis.as_ref().ok_or_else(|| anyhow::anyhow!("no pre-analysis"))?;
    assert_eq!(pre.state, PreAnalysisState::Done);
    assert_eq!(pre.ctu_prepared, 2);
    assert_eq!(pre.ctu_failed, 1);
    assert_eq!(pre.stats_collected, 3);

    let arch_dir = config.ctu_dir().join("x86_64");
    assert!(!arch_dir.join(TEMP_FNMAP_FOLDER).exists());
    let map = read_global_map(&arch_dir.join(FUNC_MAP_FILE))?;
    assert!(!map.contains_key("c:@F@shared"), "ambiguous definition must be dropped");
    assert_eq!(map.len(), 2);
    for name in ["a", "b"] {
        let source = src.join(format!("{name}.c"));
        let ast = ast_path(&config.ctu_dir(), "x86_64", &source);
        assert!(ast.exists(), "{} missing", ast.display());
        let entry = &map[&format!("c:@F@{name}_only")];
        assert!(ast.ends_with(entry), "{entry} should name {}", ast.display());
    }
    let special = fs::read_to_string(config.stats_dir().join("SpecialReturn.yaml"))?;
    assert!(special.contains("{name: parse_int, relation: EQ, value: 0}"));

    // Analysis
    let summary = run.summary.as_ref().ok_or_else(|| anyhow::anyhow!("no summary"))?;
    assert_eq!(summary.state, SchedulerState::Done);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(run.exit_code(), CtupipeExit::AnalysisFailed);

    let archives: Vec<PathBuf> = fs::read_dir(config.output_dir.join("failed"))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    assert_eq!(archives.len(), 1);
    let name = archives[0].file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    assert!(name.starts_with("broken.c_clangsa_"));
    assert!(name.ends_with("_ctu_compile_error.json"));
    let archive: serde_json::Value = serde_json::from_str(&fs::read_to_string(&archives[0])?)?;
    assert_eq!(archive["toolchain"], "/fake/resource");
    let argv: Vec<String> = serde_json::from_value(archive["analyzer_command"].clone())?;
    assert!(argv.iter().any(|a| a.starts_with("ctu-dir=") && a.ends_with("x86_64")));
    assert!(argv.iter().any(|a| a.starts_with("api-metadata-path=")));

    // Metadata
    let metadata = RunMetadata::load(&config.output_dir.join(METADATA_FILE))?;
    assert_eq!(metadata.analyzers["clangsa"].version, "fake clang version 1.0");
    assert_eq!(metadata.analyzers["clangsa"].statistics.successful, 2);
    assert_eq!(metadata.result_source_files.len(), 2);
    assert!(metadata.timestamps.end >= metadata.timestamps.begin);
    Ok(())
}
