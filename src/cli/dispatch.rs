//! Command dispatch and the two-phase pipeline behind `ctupipe analyze`.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use super::args::{AnalyzeArgs, Commands};
use super::signals;
use crate::analysis::AnalysisScheduler;
use crate::analyzers::Analyzers;
use crate::cancel::Interrupt;
use crate::config::Config;
use crate::exit::CtupipeExit;
use crate::logging;
use crate::metadata::{RunMetadata, METADATA_FILE};
use crate::pre_analysis::{PreAnalysisReport, PreAnalysisScheduler, PreAnalysisState};
use crate::skiplist::{NoSkip, SkipHandler, SkipList};
use crate::types::{AnalyzerType, CompilationAction, RunSummary, SchedulerState};

/// Executes the parsed command.
///
/// # Errors
/// Returns error if the command handler fails.
pub fn execute(command: Commands) -> Result<CtupipeExit> {
    match command {
        Commands::Analyze(args) => handle_analyze(&args),
    }
}

/// Result of both passes.
#[derive(Debug)]
pub struct PipelineRun {
    pub pre_analysis: Option<PreAnalysisReport>,
    /// `None` when pre-analysis was interrupted and analysis never started.
    pub summary: Option<RunSummary>,
    pub metadata: RunMetadata,
}

impl PipelineRun {
    #[must_use]
    pub fn interrupted(&self) -> bool {
        let pre = self
            .pre_analysis
            .as_ref()
            .is_some_and(|r| r.state == PreAnalysisState::Interrupted);
        let main = self
            .summary
            .as_ref()
            .is_some_and(|s| s.state == SchedulerState::Interrupted);
        pre || main
    }

    #[must_use]
    pub fn exit_code(&self) -> CtupipeExit {
        if self.interrupted() {
            return CtupipeExit::Interrupted;
        }
        match &self.summary {
            Some(s) if s.failed > 0 => CtupipeExit::AnalysisFailed,
            _ => CtupipeExit::Success,
        }
    }
}

/// Runs pre-analysis (when CTU or statistics are on) to completion, then the
/// analysis pass, and writes `metadata.json`.
///
/// # Errors
/// Returns error on setup failures; per-unit failures are only counted.
pub fn run_pipeline(
    config: &Config,
    analyzers: &Analyzers,
    skip: &dyn SkipList,
    interrupt: &Interrupt,
    actions: &[CompilationAction],
) -> Result<PipelineRun> {
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("cannot create {}", config.output_dir.display()))?;
    let mut metadata = RunMetadata::new(&config.output_dir);

    let pre_analysis = if config.needs_pre_analysis() {
        let report = PreAnalysisScheduler::new(config, skip, interrupt.clone()).run(actions)?;
        if report.state == PreAnalysisState::Interrupted {
            return Ok(PipelineRun {
                pre_analysis: Some(report),
                summary: None,
                metadata,
            });
        }
        Some(report)
    } else {
        None
    };

    let used: BTreeSet<AnalyzerType> = actions.iter().map(|a| a.analyzer_type).collect();
    metadata.record_versions(analyzers, used);

    let summary = AnalysisScheduler::new(config, analyzers, skip, interrupt.clone())
        .run(actions, &mut metadata)?;
    metadata.finish();
    let path = config.output_dir.join(METADATA_FILE);
    metadata.save(&path)?;

    Ok(PipelineRun {
        pre_analysis,
        summary: Some(summary),
        metadata,
    })
}

/// Reads the JSON action list.
///
/// # Errors
/// Returns error if the file cannot be read or is not a JSON array of actions.
pub fn load_actions(path: &Path) -> Result<Vec<CompilationAction>> {
    let text = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let actions = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a list of compilation actions", path.display()))?;
    Ok(actions)
}

fn build_config(args: &AnalyzeArgs) -> Result<Config> {
    let mut config = Config::load(&args.output, args.config.as_deref())?;
    config.verbose = args.verbose;
    if let Some(jobs) = args.jobs {
        config.analysis.jobs = jobs.max(1);
    }
    if let Some(timeout) = args.timeout {
        config.analysis.timeout = timeout;
    }
    if args.ctu {
        config.ctu.enabled = true;
    }
    if args.ctu_reanalyze_on_failure {
        config.ctu.reanalyze_on_failure = true;
    }
    if args.stats {
        config.statistics.enabled = true;
    }
    if args.skip.is_some() {
        config.skip.file.clone_from(&args.skip);
    }
    config.validate()?;
    Ok(config)
}

fn load_skip(config: &Config) -> Result<Box<dyn SkipList>> {
    match &config.skip.file {
        Some(path) => Ok(Box::new(SkipHandler::from_file(path)?)),
        None => Ok(Box::new(NoSkip)),
    }
}

fn handle_analyze(args: &AnalyzeArgs) -> Result<CtupipeExit> {
    logging::init_tracing(args.verbose);

    let input = build_config(args).and_then(|config| {
        let actions = load_actions(&args.actions)?;
        let skip = load_skip(&config)?;
        Ok((config, actions, skip))
    });
    let (config, actions, skip) = match input {
        Ok(input) => input,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red());
            return Ok(CtupipeExit::InvalidInput);
        }
    };

    let interrupt = Interrupt::new();
    signals::install(interrupt.clone()).context("cannot install signal handling")?;

    let analyzers = Analyzers::from_config(&config);
    let run = run_pipeline(&config, &analyzers, skip.as_ref(), &interrupt, &actions)?;
    print_summary(&run);
    Ok(run.exit_code())
}

fn print_summary(run: &PipelineRun) {
    if let Some(pre) = &run.pre_analysis {
        println!(
            "{} {} prepared, {} failed, {} map entries",
            "CTU:".bold(),
            pre.ctu_prepared,
            pre.ctu_failed,
            pre.merge.total_entries()
        );
    }
    let Some(summary) = &run.summary else {
        println!("{}", "Interrupted during pre-analysis".yellow().bold());
        return;
    };
    let failed = if summary.failed > 0 {
        summary.failed.to_string().red().bold()
    } else {
        summary.failed.to_string().green()
    };
    println!(
        "{} {} successful, {} failed, {} skipped, {} reanalyzed",
        "Summary:".bold(),
        summary.successful.to_string().green(),
        failed,
        summary.skipped,
        summary.reanalyzed
    );
    if run.interrupted() {
        println!("{}", "Interrupted".yellow().bold());
    }
}
