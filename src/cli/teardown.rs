use std::time::Duration;

use clap::Parser;

use super::{PROVIDERS, RepositoryArgs};
use crate::config::parse_duration_arg;

/// Arguments for the teardown command
#[derive(Parser, Debug)]
#[command(after_help = "EXAMPLES:\n  \
                   Delete a GitHub management repository:\n    \
                   groundwork teardown github --owner acme --repository management\n\n\
                   Delete without confirmation:\n    \
                   groundwork teardown gitlab --owner acme --repository management --yes")]
pub struct TeardownArgs {
    /// Git hosting backend
    #[arg(value_parser = PROVIDERS)]
    pub provider: String,

    #[command(flatten)]
    pub repository: RepositoryArgs,

    /// Timeout of the deletion (e.g. 1m)
    #[arg(long, value_parser = parse_duration_arg)]
    pub timeout: Option<Duration>,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}
