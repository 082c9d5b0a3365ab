//! Analysis of one translation unit: invocation, classification,
//! persistence of the outcome and the optional CTU-less retry.

use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::analyzers::{AnalyzerDriver, Analyzers};
use crate::cancel::Interrupt;
use crate::config::Config;
use crate::error::{IoResultExt, PipelineError, Result};
use crate::process::{ProcessRunner, TimeoutWatcher};
use crate::progress::Progress;
use crate::skiplist::SkipList;
use crate::types::{AnalysisStatus, AnalyzerType, CompilationAction, FailureKind, ResultHandler};

use super::archive::{archive_name, archive_names, FailureArchive};
use super::{ActionMap, FAILED_DIR, STAGING_DIR, SUCCESS_DIR};

/// Return code recorded when the worker itself failed.
pub const WORKER_ERROR_CODE: i32 = 1;

/// Read-only state shared by every worker of one scheduler run.
pub struct WorkerContext<'a> {
    pub config: &'a Config,
    pub analyzers: &'a Analyzers,
    pub skip: &'a dyn SkipList,
    /// Every action of the build keyed by absolute source, for archive cross-references.
    pub actions: &'a ActionMap,
    pub runner: &'a ProcessRunner,
    pub progress: &'a Progress,
    pub interrupt: &'a Interrupt,
}

/// Terminal outcome of one translation unit.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub analyzer: AnalyzerType,
    pub source: PathBuf,
    pub status: AnalysisStatus,
    pub return_code: i32,
    /// The unit was retried without CTU.
    pub reanalyzed: bool,
    /// Persisted artifact when the unit succeeded and the report was kept.
    pub artifact: Option<PathBuf>,
    /// Failure archives written by any attempt.
    pub archives: Vec<PathBuf>,
}

struct Attempt {
    rh: ResultHandler,
    status: AnalysisStatus,
    artifact: Option<PathBuf>,
    archive: Option<PathBuf>,
}

/// Analyzes `action` and logs exactly one progress line for it.
///
/// Never panics and never fails: errors and panics inside the procedure
/// become a generic failure with [`WORKER_ERROR_CODE`].
pub fn analyze(ctx: &WorkerContext<'_>, action: &CompilationAction) -> WorkerOutcome {
    let source = action.absolute_source();
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| analyze_action(ctx, action))) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::debug!(source = %source.display(), "worker failed: {e}");
            generic_failure(action)
        }
        Err(payload) => {
            tracing::debug!(
                source = %source.display(),
                "worker panicked: {}",
                panic_message(payload.as_ref())
            );
            generic_failure(action)
        }
    };

    let checked = ctx.progress.tick();
    tracing::info!(
        "[{checked}/{}] {} {} {}",
        ctx.progress.total(),
        outcome.analyzer,
        source.display(),
        outcome.status
    );
    outcome
}

fn analyze_action(ctx: &WorkerContext<'_>, action: &CompilationAction) -> Result<WorkerOutcome> {
    let driver = ctx.analyzers.get(action.analyzer_type).ok_or_else(|| {
        PipelineError::Other(format!("no driver registered for {}", action.analyzer_type))
    })?;

    let use_ctu = ctx.config.ctu.enabled && driver.supports_ctu();
    let mut archives = Vec::new();
    let mut attempt = run_attempt(ctx, driver, action, use_ctu)?;
    archives.extend(attempt.archive.take());

    let mut reanalyzed = false;
    if attempt.rh.ctu_enabled
        && matches!(attempt.status, AnalysisStatus::Failed(_))
        && ctx.config.ctu.reanalyze_on_failure
        && !ctx.interrupt.is_cancelled()
    {
        tracing::info!(
            source = %action.absolute_source().display(),
            "CTU analysis failed, retrying without CTU"
        );
        attempt = run_attempt(ctx, driver, action, false)?;
        archives.extend(attempt.archive.take());
        reanalyzed = true;
    }

    Ok(WorkerOutcome {
        analyzer: action.analyzer_type,
        source: action.absolute_source(),
        status: attempt.status,
        return_code: attempt.rh.analyzer_returncode,
        reanalyzed,
        artifact: attempt.artifact,
        archives,
    })
}

/// One invocation with its own staging directory.
fn run_attempt(
    ctx: &WorkerContext<'_>,
    driver: &dyn AnalyzerDriver,
    action: &CompilationAction,
    ctu: bool,
) -> Result<Attempt> {
    let mut rh = driver.construct_result_handler(action, &ctx.config.output_dir);
    rh.ctu_enabled = ctu;

    let staging = ctx
        .config
        .output_dir
        .join(STAGING_DIR)
        .join(Uuid::new_v4().simple().to_string());
    fs::create_dir_all(&staging).at_path(&staging)?;
    let file_name = rh
        .analyzer_result_file
        .file_name()
        .map_or_else(|| "result".into(), ToOwned::to_owned);
    rh.raw_output_file = staging.join(file_name);

    let attempt = execute(ctx, driver, action, rh);
    if let Err(e) = fs::remove_dir_all(&staging) {
        tracing::debug!(dir = %staging.display(), "could not remove staging directory: {e}");
    }
    attempt
}

fn execute(
    ctx: &WorkerContext<'_>,
    driver: &dyn AnalyzerDriver,
    action: &CompilationAction,
    mut rh: ResultHandler,
) -> Result<Attempt> {
    let ctu_dir = rh.ctu_enabled.then(|| ctx.config.ctu_dir());
    rh.analyzer_cmd = driver.construct_command(action, &rh, ctu_dir.as_deref())?;

    let timeout = ctx.config.timeout();
    let signal = ctx.config.analysis.kill_signal;
    let mut watcher: Option<TimeoutWatcher> = None;
    let result = ctx.runner.run(&rh.analyzer_cmd, &[], &action.directory, |handle| {
        watcher = timeout.map(|t| TimeoutWatcher::attach(handle, t, signal));
    });
    let timed_out = watcher.as_mut().is_some_and(TimeoutWatcher::poll);
    tracing::debug!(
        source = %rh.analyzed_source_file.display(),
        exit_code = result.exit_code(),
        ctu = rh.ctu_enabled,
        "analyzer finished in {} ms",
        result.duration_ms()
    );

    rh.absorb(result);
    if timed_out {
        rh.mark_timed_out(ctx.config.analysis.timeout);
    } else if ctx.interrupt.is_cancelled() && rh.analyzer_returncode != 0 {
        return Ok(Attempt {
            rh,
            status: AnalysisStatus::Cancelled,
            artifact: None,
            archive: None,
        });
    }

    match driver.classify(&rh) {
        None => {
            let artifact = persist_success(ctx, driver, &rh)?;
            Ok(Attempt {
                rh,
                status: AnalysisStatus::Success,
                artifact,
                archive: None,
            })
        }
        Some(kind) => {
            let archive = persist_failure(ctx, driver, action, &rh, kind)?;
            Ok(Attempt {
                rh,
                status: AnalysisStatus::Failed(kind),
                artifact: None,
                archive: Some(archive),
            })
        }
    }
}

fn persist_success(
    ctx: &WorkerContext<'_>,
    driver: &dyn AnalyzerDriver,
    rh: &ResultHandler,
) -> Result<Option<PathBuf>> {
    let output_dir = &ctx.config.output_dir;
    let artifact = &rh.analyzer_result_file;
    driver.materialize_output(rh)?;

    let fresh = if rh.raw_output_file.exists() {
        persist_no_clobber(&rh.raw_output_file, artifact)?
    } else {
        tracing::warn!(
            source = %rh.analyzed_source_file.display(),
            "analyzer succeeded without writing {}",
            rh.raw_output_file.display()
        );
        false
    };

    for name in archive_names(&rh.result_base(), rh.ctu_enabled) {
        remove_if_present(&output_dir.join(FAILED_DIR).join(name));
    }
    write_success_logs(output_dir, rh)?;

    if fresh {
        driver.postprocess(artifact)?;
        if every_file_skipped(ctx.skip, driver, artifact) {
            tracing::debug!(artifact = %artifact.display(), "report only covers skipped files, dropping it");
            remove_if_present(artifact);
            return Ok(None);
        }
    }
    if !artifact.exists() {
        return Ok(None);
    }

    let sidecar = rh.source_sidecar();
    fs::write(&sidecar, rh.analyzed_source_file.to_string_lossy().as_bytes()).at_path(&sidecar)?;
    Ok(Some(artifact.clone()))
}

/// Moves `raw` to `target` unless `target` already exists. Returns whether it moved.
fn persist_no_clobber(raw: &Path, target: &Path) -> Result<bool> {
    match fs::hard_link(raw, target) {
        Ok(()) => {
            remove_if_present(raw);
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            tracing::debug!(artifact = %target.display(), "result already present, keeping it");
            Ok(false)
        }
        // Filesystems without hard links.
        Err(_) if !target.exists() => {
            fs::rename(raw, target).at_path(target)?;
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

fn every_file_skipped(skip: &dyn SkipList, driver: &dyn AnalyzerDriver, artifact: &Path) -> bool {
    match driver.referenced_files(artifact) {
        Ok(files) => !files.is_empty() && files.iter().all(|f| skip.should_skip(f)),
        Err(e) => {
            tracing::debug!(artifact = %artifact.display(), "could not read report files: {e}");
            false
        }
    }
}

fn persist_failure(
    ctx: &WorkerContext<'_>,
    driver: &dyn AnalyzerDriver,
    action: &CompilationAction,
    rh: &ResultHandler,
    kind: FailureKind,
) -> Result<PathBuf> {
    let output_dir = &ctx.config.output_dir;
    let archive = FailureArchive::collect(action, rh, kind, driver.toolchain_info(), ctx.actions);
    let name = archive_name(&rh.result_base(), rh.ctu_enabled, kind);
    let path = archive.write(&output_dir.join(FAILED_DIR), &name)?;

    remove_if_present(&rh.analyzer_result_file);
    remove_if_present(&rh.source_sidecar());
    let (stdout_log, stderr_log) = success_logs(output_dir, &rh.result_base());
    remove_if_present(&stdout_log);
    remove_if_present(&stderr_log);

    tracing::debug!(archive = %path.display(), "{kind} archived");
    Ok(path)
}

/// `<output>/success/<base>.stdout.txt` and `.stderr.txt`.
#[must_use]
pub fn success_logs(output_dir: &Path, base: &str) -> (PathBuf, PathBuf) {
    let dir = output_dir.join(SUCCESS_DIR);
    (
        dir.join(format!("{base}.stdout.txt")),
        dir.join(format!("{base}.stderr.txt")),
    )
}

fn write_success_logs(output_dir: &Path, rh: &ResultHandler) -> Result<()> {
    let (stdout_log, stderr_log) = success_logs(output_dir, &rh.result_base());
    if let Some(dir) = stdout_log.parent() {
        fs::create_dir_all(dir).at_path(dir)?;
    }
    fs::write(&stdout_log, &rh.analyzer_stdout).at_path(&stdout_log)?;
    fs::write(&stderr_log, &rh.analyzer_stderr).at_path(&stderr_log)?;
    Ok(())
}

pub(super) fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!(path = %path.display(), "could not remove: {e}"),
    }
}

fn generic_failure(action: &CompilationAction) -> WorkerOutcome {
    WorkerOutcome {
        analyzer: action.analyzer_type,
        source: action.absolute_source(),
        status: AnalysisStatus::Failed(FailureKind::Unknown),
        return_code: WORKER_ERROR_CODE,
        reanalyzed: false,
        artifact: None,
        archives: Vec::new(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
