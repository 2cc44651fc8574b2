//! Groundwork - GitOps bootstrap
//!
//! Command line entry point; everything else lives in the library.

use clap::Parser;
use miette::Diagnostic;
use tracing_subscriber::EnvFilter;

use groundwork::cli::{Cli, Commands};
use groundwork::commands;

fn init_logging(verbose: bool) {
    let default = if verbose { "groundwork=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Bootstrap(args) => commands::bootstrap::run(config, args),
        Commands::Teardown(args) => commands::teardown::run(config, args),
        Commands::Version => commands::version::run(),
        Commands::Completions(args) => commands::completions::run(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        if let Some(help) = e.root().help() {
            eprintln!("  help: {help}");
        }
        std::process::exit(1);
    }
}
