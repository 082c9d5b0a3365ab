// tests/integration_scheduler.rs
//! Analysis scheduler: pool isolation, aggregation, output housekeeping and
//! operator interrupts.
#![cfg(unix)]

use anyhow::Result;
use ctupipe_core::analysis::AnalysisScheduler;
use ctupipe_core::analyzers::{AnalyzerDriver, Analyzers};
use ctupipe_core::cancel::Interrupt;
use ctupipe_core::config::Config;
use ctupipe_core::metadata::RunMetadata;
use ctupipe_core::skiplist::{NoSkip, SkipHandler, SkipList};
use ctupipe_core::types::{
    AnalyzerType, CompilationAction, ResultHandler, RunSummary, SchedulerState,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// --- Helpers ---

type Script = dyn Fn(&CompilationAction, bool) -> String + Send + Sync;

struct ScriptDriver {
    script: Box<Script>,
    ctu: bool,
}

impl AnalyzerDriver for ScriptDriver {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::ClangSa
    }

    fn construct_command(
        &self,
        action: &CompilationAction,
        rh: &ResultHandler,
        ctu_dir: Option<&Path>,
    ) -> ctupipe_core::error::Result<Vec<String>> {
        Ok(vec![
            "sh".into(),
            "-c".into(),
            (self.script)(action, ctu_dir.is_some()),
            "sh".into(),
            rh.raw_output_file.to_string_lossy().into_owned(),
        ])
    }

    fn supports_ctu(&self) -> bool {
        self.ctu
    }
}

fn analyzers(
    ctu: bool,
    script: impl Fn(&CompilationAction, bool) -> String + Send + Sync + 'static,
) -> Analyzers {
    let mut analyzers = Analyzers::new();
    analyzers.register(Arc::new(ScriptDriver {
        script: Box::new(script),
        ctu,
    }));
    analyzers
}

fn actions(dir: &Path, names: &[&str]) -> Result<Vec<CompilationAction>> {
    let src = dir.join("src");
    fs::create_dir_all(&src)?;
    names
        .iter()
        .map(|name| {
            let path = src.join(name);
            fs::write(&path, "int f(void);\n")?;
            Ok(CompilationAction::new(path, &src, AnalyzerType::ClangSa))
        })
        .collect()
}

fn run(
    config: &Config,
    analyzers: &Analyzers,
    skip: &dyn SkipList,
    interrupt: &Interrupt,
    actions: &[CompilationAction],
    metadata: &mut RunMetadata,
) -> Result<(RunSummary, SchedulerState)> {
    let mut scheduler = AnalysisScheduler::new(config, analyzers, skip, interrupt.clone());
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    let summary = scheduler.run(actions, metadata)?;
    Ok((summary, scheduler.state()))
}

fn writes_report(_: &CompilationAction, _: bool) -> String {
    r#"echo '<plist/>' > "$1""#.to_string()
}

// --- Aggregation ---

#[test]
fn panicking_unit_does_not_stop_the_pool() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = Config::new(dir.path().join("out"));
    config.analysis.jobs = 3;
    let analyzers = analyzers(false, |action, _| {
        assert!(!action.source.ends_with("boom.c"), "driver bug");
        writes_report(action, false)
    });
    let actions = actions(dir.path(), &["a.c", "b.c", "boom.c", "c.c", "d.c", "e.c"])?;
    let mut metadata = RunMetadata::new(&config.output_dir);

    let (summary, state) = run(&config, &analyzers, &NoSkip, &Interrupt::new(), &actions, &mut metadata)?;

    assert_eq!(state, SchedulerState::Done);
    assert_eq!(summary.processed(), actions.len());
    assert_eq!(summary.successful, 5);
    assert_eq!(summary.failed, 1);
    let stats = &summary.statistics["clangsa"];
    assert_eq!(stats.failed_sources, vec![dir.path().join("src").join("boom.c")]);
    Ok(())
}

#[test]
fn sidecars_fold_into_metadata_and_scratch_is_removed() -> Result<()> {
    let dir = TempDir::new()?;
    let config = Config::new(dir.path().join("out"));
    let analyzers = analyzers(false, writes_report);
    let actions = actions(dir.path(), &["a.c", "b.c"])?;
    let mut metadata = RunMetadata::new(&config.output_dir);
    metadata
        .analyzers
        .entry("clangsa".to_string())
        .or_default()
        .version = "fake 1.0".to_string();

    let (summary, _) = run(&config, &analyzers, &NoSkip, &Interrupt::new(), &actions, &mut metadata)?;

    assert_eq!(summary.successful, 2);
    assert_eq!(summary.statistics["clangsa"].version, "fake 1.0");
    assert_eq!(metadata.analyzers["clangsa"].statistics.successful, 2);

    let sources: Vec<&PathBuf> = metadata.result_source_files.values().collect();
    assert_eq!(sources.len(), 2);
    for action in &actions {
        assert!(sources.contains(&&action.absolute_source()));
    }
    for artifact in metadata.result_source_files.keys() {
        assert!(artifact.exists(), "{} should exist", artifact.display());
    }

    let out = &config.output_dir;
    let leftovers: Vec<PathBuf> = fs::read_dir(out)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "source"))
        .collect();
    assert!(leftovers.is_empty(), "sidecars left behind: {leftovers:?}");
    assert!(!out.join(".tmp").exists());
    assert!(!out.join("failed").exists(), "empty failed dir is removed");
    assert!(out.join("success").is_dir());
    Ok(())
}

#[test]
fn skipped_actions_are_never_dispatched() -> Result<()> {
    let dir = TempDir::new()?;
    let config = Config::new(dir.path().join("out"));
    let analyzers = analyzers(false, |action, _| {
        assert!(!action.source.ends_with("vendor.c"), "skipped action dispatched");
        writes_report(action, false)
    });
    let actions = actions(dir.path(), &["main.c", "vendor.c"])?;
    let skip = SkipHandler::parse("-*/vendor.c\n")?;
    let mut metadata = RunMetadata::new(&config.output_dir);

    let (summary, _) = run(&config, &analyzers, &skip, &Interrupt::new(), &actions, &mut metadata)?;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(metadata.skipped, 1);
    Ok(())
}

#[test]
fn ctu_retries_are_counted() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = Config::new(dir.path().join("out"));
    config.ctu.enabled = true;
    config.ctu.reanalyze_on_failure = true;
    let analyzers = analyzers(true, |action, ctu| {
        if ctu {
            "exit 254".to_string()
        } else {
            writes_report(action, ctu)
        }
    });
    let actions = actions(dir.path(), &["a.c", "b.c"])?;
    let mut metadata = RunMetadata::new(&config.output_dir);

    let (summary, _) = run(&config, &analyzers, &NoSkip, &Interrupt::new(), &actions, &mut metadata)?;

    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.reanalyzed, 2);
    let archives = fs::read_dir(config.output_dir.join("failed"))?.count();
    assert_eq!(archives, 2, "CTU crash archives are kept for debugging");
    Ok(())
}

// --- Reruns ---

#[test]
fn rerun_replaces_previous_reports() -> Result<()> {
    let dir = TempDir::new()?;
    let config = Config::new(dir.path().join("out"));
    let actions = actions(dir.path(), &["a.c"])?;

    let mut first = RunMetadata::new(&config.output_dir);
    let stale = analyzers(false, |_, _| r#"echo first > "$1""#.to_string());
    let (summary, _) = run(&config, &stale, &NoSkip, &Interrupt::new(), &actions, &mut first)?;
    assert_eq!(summary.successful, 1);

    let mut second = RunMetadata::new(&config.output_dir);
    let fresh = analyzers(false, |_, _| r#"echo second > "$1""#.to_string());
    let (summary, _) = run(&config, &fresh, &NoSkip, &Interrupt::new(), &actions, &mut second)?;
    assert_eq!(summary.successful, 1);

    assert_eq!(second.result_source_files.len(), 1);
    for (artifact, source) in &second.result_source_files {
        assert_eq!(source, &actions[0].absolute_source());
        assert_eq!(fs::read_to_string(artifact)?, "second\n");
    }
    Ok(())
}

#[test]
fn duplicate_actions_in_one_run_keep_one_report() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = Config::new(dir.path().join("out"));
    config.analysis.jobs = 2;
    let analyzers = analyzers(false, writes_report);
    let mut actions = actions(dir.path(), &["a.c"])?;
    actions.push(actions[0].clone());
    let mut metadata = RunMetadata::new(&config.output_dir);

    let (summary, _) = run(&config, &analyzers, &NoSkip, &Interrupt::new(), &actions, &mut metadata)?;

    assert_eq!(summary.successful, 2);
    assert_eq!(metadata.result_source_files.len(), 1);
    Ok(())
}

// --- Interrupts ---

#[cfg(target_os = "linux")]
fn is_gone(pid: &str) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .is_some_and(|rest| rest.trim_start().starts_with('Z')),
    }
}

#[test]
fn interrupt_kills_running_units_and_stops_dispatch() -> Result<()> {
    let dir = TempDir::new()?;
    let pids = dir.path().join("pids");
    fs::create_dir_all(&pids)?;
    let mut config = Config::new(dir.path().join("out"));
    config.analysis.jobs = 3;

    let pid_dir = pids.clone();
    let analyzers = analyzers(false, move |action, _| {
        let name = action.source_file_name();
        let base = pid_dir.join(name);
        format!(
            "echo $$ > '{base}.pid'; sleep 30 & echo $! > '{base}.child'; wait",
            base = base.display()
        )
    });
    let names: Vec<String> = (0..10).map(|i| format!("unit{i}.c")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let actions = actions(dir.path(), &name_refs)?;
    let interrupt = Interrupt::new();

    let trigger = {
        let interrupt = interrupt.clone();
        let pids = pids.clone();
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(15);
            while Instant::now() < deadline {
                let children = fs::read_dir(&pids)
                    .map(|d| {
                        d.filter_map(|e| e.ok())
                            .filter(|e| e.path().extension().is_some_and(|x| x == "child"))
                            .count()
                    })
                    .unwrap_or(0);
                if interrupt.live_count() == 3 && children == 3 {
                    break;
                }
                thread::sleep(Duration::from_millis(20));
            }
            thread::sleep(Duration::from_millis(100));
            interrupt.trigger();
        })
    };

    let start = Instant::now();
    let mut metadata = RunMetadata::new(&config.output_dir);
    let (summary, state) = run(&config, &analyzers, &NoSkip, &interrupt, &actions, &mut metadata)?;
    let _ = trigger.join();

    assert_eq!(state, SchedulerState::Interrupted);
    assert!(start.elapsed() < Duration::from_secs(25), "run must not wait for sleepers");
    assert_eq!(interrupt.live_count(), 0);
    assert_eq!(summary.successful, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.cancelled, actions.len());

    let started: Vec<PathBuf> = fs::read_dir(&pids)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|x| x == "pid"))
        .collect();
    assert_eq!(started.len(), 3, "no unit may start after the interrupt");

    #[cfg(target_os = "linux")]
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        for entry in fs::read_dir(&pids)? {
            let path = entry?.path();
            let pid = fs::read_to_string(&path)?.trim().to_string();
            while !is_gone(&pid) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(20));
            }
            assert!(is_gone(&pid), "{} ({pid}) survived the interrupt", path.display());
        }
    }
    Ok(())
}
