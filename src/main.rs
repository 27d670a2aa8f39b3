mod cli;
mod commands;
mod config;
mod progress;
mod shell;
mod ui;

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use console::Term;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub json: bool,
    /// Prompts allowed: a terminal on both ends and no `--noninteractive`
    pub interactive: bool,
    pub cwd: PathBuf,
    pub config_path: Option<PathBuf>,
}

fn main() -> ExitCode {
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

    match run(cli) {
        Ok(code) => code,
        Err(err) => report(&err),
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Some(dir) = &cli.chdir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("Could not change directory to {}", dir.display()))?;
    }
    let cwd = std::env::current_dir().context("Could not determine current directory")?;

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        json: cli.json,
        interactive: !cli.noninteractive && io::stdin().is_terminal() && Term::stdout().is_term(),
        cwd,
        config_path: cli.config.clone(),
    };
    log::trace!("verbosity {}, interactive: {}", ctx.verbose, ctx.interactive);

    match cli.command {
        Command::Init { force } => commands::init::run(&ctx, force)?,
        Command::Start(args) => commands::start::run(&ctx, &args)?,
        Command::Shell(args) => return commands::shell::run(&ctx, &args),
        Command::Sync(args) => commands::sync::run(&ctx, &args)?,
        Command::Status => commands::status::run(&ctx)?,
        Command::Destroy { force } => commands::destroy::run(&ctx, force)?,
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "ramws", &mut io::stdout());
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Print `err` and pick the exit code for it.
fn report(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<syncengine::Error>() {
        Some(engine) if engine.is_expected() => {
            ui::warn(&engine.to_string());
            ExitCode::from(engine.exit_code())
        }
        Some(engine) => {
            ui::error(&format!("{err:#}"));
            if engine.is_retryable() {
                ui::dim("Another ramws command is running; try again shortly");
            }
            ExitCode::from(engine.exit_code())
        }
        None => {
            ui::error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}
