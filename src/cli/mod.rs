//! CLI definitions using clap derive API
//!
//! This module is organized into submodules for each command's argument types:
//! - bootstrap: Bootstrap command arguments
//! - teardown: Teardown command arguments
//! - completions: Completions command arguments

use clap::builder::{Styles, styling::AnsiColor};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod bootstrap;
pub mod completions;
pub mod teardown;

pub use bootstrap::BootstrapArgs;
pub use completions::CompletionsArgs;
pub use teardown::TeardownArgs;

/// Provider names accepted on the command line.
pub const PROVIDERS: [&str; 3] = ["github", "gitea", "gitlab"];

/// Groundwork - GitOps bootstrap
///
/// Create a management repository and install the platform controllers through it.
#[derive(Parser, Debug)]
#[command(
    name = "groundwork",
    author,
    version,
    color = clap::ColorChoice::Auto,
    styles = Styles::styled()
        .header(AnsiColor::Green.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default().bold())
        .placeholder(AnsiColor::Cyan.on_default()),
    about = "Bootstrap a GitOps management repository and its controllers",
    long_about = "Groundwork creates (or reuses) a management repository on GitHub, Gitea or GitLab, \
                  commits the reconciliation agent, cert-manager and the platform controllers into it, \
                  and waits until the cluster has reconciled every one of them.",
    after_help = "\x1b[1m\x1b[32mExamples:\x1b[0m\n   \
                  groundwork bootstrap github --owner acme --repository management   \x1b[90m# Bootstrap on GitHub\x1b[0m\n   \
                  groundwork bootstrap gitea --hostname gitea.local --owner acme --repository mgmt\n   \
                  groundwork teardown github --owner acme --repository management    \x1b[90m# Delete the repository\x1b[0m\n\n\
                  "
)]
pub struct Cli {
    /// Configuration file (defaults to ./groundwork.yaml when present)
    #[arg(long, short = 'c', global = true, env = "GROUNDWORK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bootstrap a management repository and install the components
    Bootstrap(BootstrapArgs),

    /// Delete a management repository
    Teardown(TeardownArgs),

    /// Show version information
    #[command(hide = true)]
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Repository identity shared by bootstrap and teardown.
#[derive(Args, Debug, Clone, Default)]
pub struct RepositoryArgs {
    /// Organization or user owning the repository
    #[arg(long)]
    pub owner: Option<String>,

    /// Repository name, optionally prefixed with sub-groups (team/infra/repo)
    #[arg(long)]
    pub repository: Option<String>,

    /// API token (defaults to GITHUB_TOKEN, GITEA_TOKEN or GITLAB_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// API host of a self-hosted instance
    #[arg(long)]
    pub hostname: Option<String>,

    /// The owner is a user, not an organization
    #[arg(long)]
    pub personal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_version() {
        let cli = Cli::try_parse_from(["groundwork", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "groundwork",
            "-v",
            "-c",
            "/tmp/groundwork.yaml",
            "teardown",
            "github",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/groundwork.yaml")));
    }

    #[test]
    fn test_cli_rejects_unknown_provider() {
        assert!(Cli::try_parse_from(["groundwork", "bootstrap", "bitbucket"]).is_err());
    }

    #[test]
    fn test_cli_parsing_completions() {
        let cli = Cli::try_parse_from(["groundwork", "completions", "bash"]).unwrap();
        match cli.command {
            Commands::Completions(args) => {
                assert_eq!(args.shell, clap_complete::Shell::Bash);
            }
            _ => panic!("Expected Completions command"),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
