use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ctupipe",
    version,
    about = "CTU pre-analysis and parallel static analysis of a build"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze every compilation action of a build
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// JSON array of compilation actions
    #[arg(long, value_name = "FILE")]
    pub actions: PathBuf,
    /// Directory receiving reports, failure archives and metadata
    #[arg(long, short, value_name = "DIR")]
    pub output: PathBuf,
    /// Configuration file (defaults to ./ctupipe.toml if present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Number of parallel workers
    #[arg(long, short)]
    pub jobs: Option<usize>,
    /// Per translation unit timeout in seconds (0 disables it)
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Collect CTU data and analyze with it
    #[arg(long)]
    pub ctu: bool,
    /// Retry failed CTU analyses once without CTU
    #[arg(long)]
    pub ctu_reanalyze_on_failure: bool,
    /// Collect return-value statistics before analysis
    #[arg(long)]
    pub stats: bool,
    /// Skip file with +/- glob lines
    #[arg(long, value_name = "FILE")]
    pub skip: Option<PathBuf>,
    #[arg(long, short)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "ctupipe", "analyze", "--actions", "a.json", "-o", "out", "-j", "4", "--ctu",
            "--ctu-reanalyze-on-failure", "--timeout", "30",
        ])
        .unwrap();
        let Some(Commands::Analyze(args)) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.actions, PathBuf::from("a.json"));
        assert_eq!(args.output, PathBuf::from("out"));
        assert_eq!(args.jobs, Some(4));
        assert_eq!(args.timeout, Some(30));
        assert!(args.ctu && args.ctu_reanalyze_on_failure);
        assert!(!args.stats);
    }

    #[test]
    fn actions_are_required() {
        assert!(Cli::try_parse_from(["ctupipe", "analyze", "-o", "out"]).is_err());
    }
}
