use clap::Parser;
use colored::Colorize;
use ctupipe_core::cli::{self, Cli};
use ctupipe_core::exit::CtupipeExit;

fn main() -> CtupipeExit {
    let cli = Cli::parse();

    let result = if let Some(cmd) = cli.command {
        cli::dispatch::execute(cmd)
    } else {
        use clap::CommandFactory;
        let _ = Cli::command().print_help();
        Ok(CtupipeExit::Success)
    };

    match result {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red());
            CtupipeExit::Error
        }
    }
}
