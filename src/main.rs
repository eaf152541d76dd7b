mod builtins;
mod catalog;
mod cli;
mod commands;
mod paths;
mod privilege;
mod progress;
mod runner;
mod schema;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Explicit config file from `--config`
    pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
    };
    log::trace!("verbosity {}", ctx.verbose);

    match cli.command {
        Command::Run(args) => commands::run::run(&ctx, args),
        Command::Plan => commands::plan::run(&ctx),
        Command::Levels => commands::levels::run(&ctx),
        Command::Check => commands::check::run(&ctx),
        Command::List => commands::list::run(&ctx),
        Command::Report(args) => commands::report::run(&ctx, args),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "upkeep", &mut io::stdout());
            Ok(())
        }
    }
}
