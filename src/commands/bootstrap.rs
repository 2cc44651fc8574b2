//! Bootstrap command implementation
//!
//! Builds [`BootstrapOptions`] from the configuration file and the flags,
//! wires the real provider, registry and cluster clients, and runs the
//! orchestrator with a spinner per stage.

use std::path::Path;

use console::Style;

use crate::bootstrap::Bootstrap;
use crate::cli::BootstrapArgs;
use crate::cluster::kube::KubeClient;
use crate::commands::resolve_token;
use crate::config::{BootstrapOptions, ConfigFile};
use crate::error::Result;
use crate::progress::SpinnerReporter;
use crate::provider::{self, ProviderKind, ProviderOptions};
use crate::registry::credentials::DockerConfig;
use crate::registry::oci::{OciRegistry, RegistryLocation};

pub fn run(config: Option<&Path>, args: BootstrapArgs) -> Result<()> {
    let kind: ProviderKind = args.provider.parse()?;
    let options = options(kind, config, &args)?;

    let provider = provider::build(ProviderOptions {
        kind,
        hostname: options.hostname.clone(),
        token: options.token.clone(),
        plain_http: options.transport == "http",
        destructive_actions: false,
    })?;
    let registry = registry(&options)?;
    let cluster = KubeClient::from_kubeconfig(args.kubeconfig.as_deref(), args.context.as_deref())?;

    let mut bootstrap = Bootstrap::new(options, provider, Box::new(registry), Box::new(cluster))
        .with_reporter(Box::new(SpinnerReporter::new()));
    bootstrap.run()?;

    if let Some(repository) = bootstrap.repository() {
        println!(
            "{} Bootstrap completed, management repository {}",
            Style::new().green().bold().apply_to("✔"),
            Style::new().cyan().apply_to(&repository.full_path)
        );
    }
    Ok(())
}

/// Layers flags over the configuration file over the defaults.
pub(crate) fn options(
    kind: ProviderKind,
    config: Option<&Path>,
    args: &BootstrapArgs,
) -> Result<BootstrapOptions> {
    let mut builder = BootstrapOptions::builder(kind);
    if let Some(file) = ConfigFile::discover(config)? {
        builder = file.apply(builder)?;
    }

    macro_rules! flag {
        ($($value:expr => $setter:ident),* $(,)?) => {
            $(if let Some(value) = $value.clone() {
                builder = builder.$setter(value);
            })*
        };
    }
    flag!(
        args.repository.hostname => hostname,
        args.repository.owner => owner,
        args.repository.repository => repository_name,
        args.description => description,
        args.branch => default_branch,
        args.visibility => visibility,
        args.path => target_path,
        args.commit_message_appendix => commit_message_appendix,
        args.registry => registry,
        args.dockerconfig => docker_config,
        args.from_file => from_file,
        args.transport => transport,
        args.ca_file => ca_file,
        args.test_url => test_url,
        args.interval => interval,
        args.timeout => timeout,
    );
    if args.repository.personal {
        builder = builder.personal(true);
    }
    if !args.components.is_empty() {
        builder = builder.components(args.components.clone());
    }
    if let Some(token) = resolve_token(kind, args.repository.token.clone())? {
        builder = builder.token(token);
    }
    builder.build()
}

/// The OCI registry at `options.registry`, authenticated from the docker
/// config when it has credentials for the host.
fn registry(options: &BootstrapOptions) -> Result<OciRegistry> {
    let location = RegistryLocation::parse(&options.registry, options.transport == "http")?;
    let docker_config = match options.docker_config.clone().or_else(DockerConfig::default_path) {
        Some(path) if path.is_file() => Some(DockerConfig::load(&path)?),
        Some(path) if options.docker_config.is_some() => {
            return Err(crate::error::config::read_failed(
                path.display().to_string(),
                "file does not exist",
            ));
        }
        _ => None,
    };
    let credentials = docker_config.and_then(|c| c.credentials_for(&location.host));
    tracing::debug!(
        host = %location.host,
        authenticated = credentials.is_some(),
        "using registry"
    );
    OciRegistry::new(location, credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::time::Duration;
    use tempfile::TempDir;

    fn args(extra: &[&str]) -> BootstrapArgs {
        let mut argv = vec!["groundwork", "bootstrap", "github", "--token", "t0ken"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Bootstrap(args) => args,
            _ => panic!("Expected Bootstrap command"),
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("groundwork.yaml");
        std::fs::write(
            &path,
            "owner: acme\nrepository: from-file\nbranch: trunk\ntimeout: 1m\n",
        )
        .unwrap();

        let options = options(
            ProviderKind::GitHub,
            Some(&path),
            &args(&["--repository", "from-flag", "--path", "clusters/prod/"]),
        )
        .unwrap();
        assert_eq!(options.owner, "acme");
        assert_eq!(options.repository_name, "from-flag");
        assert_eq!(options.default_branch, "trunk");
        assert_eq!(options.target_path, "clusters/prod");
        assert_eq!(options.timeout, Duration::from_secs(60));
        assert_eq!(options.token, "t0ken");
    }

    #[test]
    fn test_invalid_visibility_rejected() {
        let err = options(
            ProviderKind::GitHub,
            None,
            &args(&["--owner", "acme", "--repository", "m", "--visibility", "secret"]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("visibility"));
    }

    #[test]
    fn test_explicit_missing_config_file_fails() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.yaml");
        assert!(options(ProviderKind::GitHub, Some(&missing), &args(&["--owner", "acme"])).is_err());
    }

    #[test]
    fn test_registry_with_docker_credentials() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"auths":{"registry.local:5000":{"username":"bot","password":"pw"}}}"#,
        )
        .unwrap();
        let options = options(
            ProviderKind::GitHub,
            None,
            &args(&[
                "--owner",
                "acme",
                "--repository",
                "m",
                "--registry",
                "registry.local:5000/mpas",
                "--dockerconfig",
                path.to_str().unwrap(),
            ]),
        )
        .unwrap();
        let oci = registry(&options).unwrap();
        assert_eq!(oci.location().host, "registry.local:5000");
        assert_eq!(oci.location().prefix, "mpas");

        let missing = BootstrapOptions {
            docker_config: Some(temp.path().join("absent.json")),
            ..options
        };
        assert!(registry(&missing).is_err());
    }
}
