use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "upkeep")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Audit a machine, diff against policy, and run maintenance tasks in order", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use this config file instead of the one in the config directory
    #[arg(long, global = true, env = "UPKEEP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run tasks in dependency order
    Run(RunArgs),

    /// Show the diff plan and what each task would act on
    Plan,

    /// Show execution levels
    Levels,

    /// Validate the task catalog
    Check,

    /// List registered tasks
    List,

    /// Show the most recent run report
    Report(ReportArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Run
// ============================================================================

#[derive(Parser)]
pub struct RunArgs {
    /// Only run these tasks (default: all)
    pub tasks: Vec<String>,

    /// Ask tasks not to change anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Run tasks that need elevation even without it
    #[arg(short, long)]
    pub force: bool,

    /// Number of parallel jobs per level
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Also run the dependencies of the selected tasks
    #[arg(long)]
    pub with_deps: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Report
// ============================================================================

#[derive(Parser)]
pub struct ReportArgs {
    /// Print the raw JSON report
    #[arg(long)]
    pub json: bool,

    /// Only show tasks that did not succeed
    #[arg(long)]
    pub failed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::parse_from(["upkeep", "-vv", "run", "a", "b", "--dry-run", "-j", "4"]);
        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.tasks, vec!["a", "b"]);
        assert!(args.dry_run);
        assert_eq!(args.jobs, Some(4));
        assert!(!args.with_deps);
    }
}
