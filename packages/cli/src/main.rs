mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{changeset, check, replay, summary, ChangesetArgs, CheckArgs, ReplayArgs, SummaryArgs};
use tracing_subscriber::EnvFilter;

/// Atlas CLI - inspect and replay map edit sessions
#[derive(Parser, Debug)]
#[command(name = "atlas")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize the changes of a recovered session
    Summary(SummaryArgs),

    /// Verify the integrity of every edit in a recovered session
    Check(CheckArgs),

    /// Print the upload changeset of a recovered session
    Changeset(ChangesetArgs),

    /// Apply an action script to a base and write a recovery log
    Replay(ReplayArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir.display().to_string(),
        Err(err) => {
            eprintln!("{} Cannot get current directory: {}", "Error:".red().bold(), err);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Summary(args) => summary(args, &cwd),
        Command::Check(args) => check(args, &cwd),
        Command::Changeset(args) => changeset(args, &cwd),
        Command::Replay(args) => replay(args, &cwd),
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
