use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{Generator, generate};
use colored::Colorize;
use foam::cli::{Cli, Commands};
use foam::output::{self, Verbosity};
use foam::{Foam, FoamContext, commands};
use std::io;
use std::process;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter directives
const LOG_ENV: &str = "FOAM_LOG";

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {e:#}", "Error:".red().bold());
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "foam=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    output::set_verbosity(if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    });

    if let Commands::Completion { shell } = cli.command {
        print_completions(shell, &mut Cli::command());
        return Ok(());
    }

    let ctx = FoamContext::new()?;
    let foam = Foam::open(&ctx)?;

    match cli.command {
        Commands::Track {
            folders,
            list,
            undo,
        } => {
            if list {
                commands::track::execute_list(&foam)
            } else if undo {
                commands::track::execute_undo(&foam)
            } else {
                commands::track::execute(&foam, &folders)
            }
        }
        Commands::Reset { folders, dry_run } => commands::reset::execute(&foam, &folders, dry_run),
        Commands::Gc => commands::gc::execute(&foam),
        Commands::Completion { .. } => Ok(()),
    }
}

fn print_completions<G: Generator>(g: G, cmd: &mut clap::Command) {
    generate(g, cmd, cmd.get_name().to_string(), &mut io::stdout());
}
