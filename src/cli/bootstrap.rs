use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use super::{PROVIDERS, RepositoryArgs};
use crate::config::parse_duration_arg;

/// Arguments for the bootstrap command
///
/// Every option left unset falls back to the configuration file, then to the
/// built-in default.
#[derive(Parser, Debug)]
#[command(after_help = "EXAMPLES:\n  \
                   Bootstrap on GitHub:\n    groundwork bootstrap github --owner acme --repository management\n\n\
                   Bootstrap a personal GitLab project into a sub-directory:\n    \
                   groundwork bootstrap gitlab --owner jane --personal --repository mgmt --path clusters/dev\n\n\
                   Install from an air-gapped archive:\n    \
                   groundwork bootstrap gitea --hostname gitea.local --owner acme --repository mgmt \\\n      \
                   --from-file ./bootstrap.ctf --registry registry.local/mpas")]
pub struct BootstrapArgs {
    /// Git hosting backend
    #[arg(value_parser = PROVIDERS)]
    pub provider: String,

    #[command(flatten)]
    pub repository: RepositoryArgs,

    /// Repository description used when creating it
    #[arg(long)]
    pub description: Option<String>,

    /// Branch the components are committed to
    #[arg(long)]
    pub branch: Option<String>,

    /// Repository visibility (public, private, internal)
    #[arg(long)]
    pub visibility: Option<String>,

    /// Directory inside the repository holding the manifests
    #[arg(long)]
    pub path: Option<String>,

    /// Paragraph appended to every commit message
    #[arg(long)]
    pub commit_message_appendix: Option<String>,

    /// Components to install (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub components: Vec<String>,

    /// Registry holding the bootstrap component
    #[arg(long)]
    pub registry: Option<String>,

    /// Docker config.json with registry credentials
    #[arg(long)]
    pub dockerconfig: Option<PathBuf>,

    /// Transport archive to copy into the registry first
    #[arg(long)]
    pub from_file: Option<PathBuf>,

    /// Transport the agent clones the repository with (http, https)
    #[arg(long)]
    pub transport: Option<String>,

    /// CA bundle the agent trusts when cloning
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    /// Repository URL the agent fetches from, overriding the clone URL
    #[arg(long, hide = true)]
    pub test_url: Option<String>,

    /// How often the agent fetches the repository (e.g. 5m)
    #[arg(long, value_parser = parse_duration_arg)]
    pub interval: Option<Duration>,

    /// Timeout of each stage (e.g. 10m)
    #[arg(long, value_parser = parse_duration_arg)]
    pub timeout: Option<Duration>,

    /// Kubeconfig file (defaults to KUBECONFIG, then ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context (defaults to the current context)
    #[arg(long)]
    pub context: Option<String>,
}
