//! Bootstrap configuration
//!
//! This module contains:
//! - [`BootstrapOptions`], the validated settings of one bootstrap run
//! - `groundwork.yaml`, an optional file supplying the same settings
//! - duration parsing shared by the file and the command line

pub mod duration;
pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::defaults;
use crate::error::{Result, config};
use crate::provider::ProviderKind;

pub use duration::{parse_duration, parse_duration_arg};
pub use file::ConfigFile;

const VISIBILITIES: &[&str] = &["public", "private", "internal"];
const TRANSPORTS: &[&str] = &["http", "https"];

/// Settings for one bootstrap run. Built and validated by [`BootstrapOptionsBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOptions {
    pub provider: ProviderKind,
    /// API host, for self-hosted backends.
    pub hostname: Option<String>,
    pub owner: String,
    pub token: String,
    pub repository_name: String,
    pub description: String,
    pub default_branch: String,
    pub visibility: String,
    pub personal: bool,
    /// Directory inside the repository holding all manifests.
    pub target_path: String,
    pub commit_message_appendix: Option<String>,
    pub components: Vec<String>,
    pub registry: String,
    pub docker_config: Option<PathBuf>,
    /// Transport archive copied into `registry` before resolving.
    pub from_file: Option<PathBuf>,
    pub transport: String,
    pub ca_file: Option<PathBuf>,
    /// Overrides the repository URL the agent fetches from.
    pub test_url: Option<String>,
    /// Agent fetch interval.
    pub interval: Duration,
    /// Timeout of the whole run up to the first health wait, and of each wait.
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl BootstrapOptions {
    pub fn builder(provider: ProviderKind) -> BootstrapOptionsBuilder {
        BootstrapOptionsBuilder::new(provider)
    }

    pub fn appendix(&self) -> Option<&str> {
        self.commit_message_appendix.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapOptionsBuilder {
    provider: ProviderKind,
    hostname: Option<String>,
    owner: Option<String>,
    token: Option<String>,
    repository_name: Option<String>,
    description: Option<String>,
    default_branch: Option<String>,
    visibility: Option<String>,
    personal: bool,
    target_path: Option<String>,
    commit_message_appendix: Option<String>,
    components: Option<Vec<String>>,
    registry: Option<String>,
    docker_config: Option<PathBuf>,
    from_file: Option<PathBuf>,
    transport: Option<String>,
    ca_file: Option<PathBuf>,
    test_url: Option<String>,
    interval: Option<Duration>,
    timeout: Option<Duration>,
    poll_interval: Option<Duration>,
}

macro_rules! setter {
    ($name:ident: $ty:ty) => {
        #[must_use]
        pub fn $name(mut self, value: impl Into<$ty>) -> Self {
            self.$name = Some(value.into());
            self
        }
    };
}

impl BootstrapOptionsBuilder {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            hostname: None,
            owner: None,
            token: None,
            repository_name: None,
            description: None,
            default_branch: None,
            visibility: None,
            personal: false,
            target_path: None,
            commit_message_appendix: None,
            components: None,
            registry: None,
            docker_config: None,
            from_file: None,
            transport: None,
            ca_file: None,
            test_url: None,
            interval: None,
            timeout: None,
            poll_interval: None,
        }
    }

    setter!(hostname: String);
    setter!(owner: String);
    setter!(token: String);
    setter!(repository_name: String);
    setter!(description: String);
    setter!(default_branch: String);
    setter!(visibility: String);
    setter!(target_path: String);
    setter!(commit_message_appendix: String);
    setter!(registry: String);
    setter!(docker_config: PathBuf);
    setter!(from_file: PathBuf);
    setter!(transport: String);
    setter!(ca_file: PathBuf);
    setter!(test_url: String);
    setter!(interval: Duration);
    setter!(timeout: Duration);
    setter!(poll_interval: Duration);

    #[must_use]
    pub fn personal(mut self, personal: bool) -> Self {
        self.personal = personal;
        self
    }

    #[must_use]
    pub fn components(mut self, components: Vec<String>) -> Self {
        self.components = Some(components);
        self
    }

    /// Applies defaults, then validates.
    pub fn build(self) -> Result<BootstrapOptions> {
        let target_path = match self.target_path.as_deref().map(|p| p.trim_end_matches('/')) {
            None | Some("") => defaults::DEFAULT_TARGET_PATH.to_string(),
            Some(path) => path.to_string(),
        };
        let options = BootstrapOptions {
            provider: self.provider,
            hostname: self.hostname.filter(|h| !h.is_empty()),
            owner: self.owner.unwrap_or_default(),
            token: self.token.unwrap_or_default(),
            repository_name: self.repository_name.unwrap_or_default(),
            description: self
                .description
                .unwrap_or_else(|| defaults::DEFAULT_DESCRIPTION.to_string()),
            default_branch: self
                .default_branch
                .unwrap_or_else(|| defaults::DEFAULT_BRANCH.to_string()),
            visibility: self
                .visibility
                .unwrap_or_else(|| defaults::DEFAULT_VISIBILITY.to_string()),
            personal: self.personal,
            target_path,
            commit_message_appendix: self.commit_message_appendix.filter(|a| !a.trim().is_empty()),
            components: self
                .components
                .filter(|c| !c.is_empty())
                .unwrap_or_else(defaults::all_components),
            registry: self
                .registry
                .unwrap_or_else(|| defaults::DEFAULT_REGISTRY.to_string()),
            docker_config: self.docker_config,
            from_file: self.from_file,
            transport: self
                .transport
                .unwrap_or_else(|| defaults::DEFAULT_TRANSPORT.to_string()),
            ca_file: self.ca_file,
            test_url: self.test_url.filter(|u| !u.is_empty()),
            interval: self.interval.unwrap_or(defaults::DEFAULT_SYNC_INTERVAL),
            timeout: self.timeout.unwrap_or(defaults::DEFAULT_TIMEOUT),
            poll_interval: self.poll_interval.unwrap_or(defaults::DEFAULT_POLL_INTERVAL),
        };
        validate(&options)?;
        Ok(options)
    }
}

fn validate(options: &BootstrapOptions) -> Result<()> {
    let required = [
        ("owner", &options.owner),
        ("repository name", &options.repository_name),
        ("token", &options.token),
        ("default branch", &options.default_branch),
        ("registry", &options.registry),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(config::invalid(format!("{name} must be set")));
        }
    }
    if !VISIBILITIES.contains(&options.visibility.as_str()) {
        return Err(config::invalid(format!(
            "visibility must be one of {}, got '{}'",
            VISIBILITIES.join(", "),
            options.visibility
        )));
    }
    if !TRANSPORTS.contains(&options.transport.as_str()) {
        return Err(config::invalid(format!(
            "transport must be http or https, got '{}'",
            options.transport
        )));
    }
    for (name, value) in [
        ("interval", options.interval),
        ("timeout", options.timeout),
        ("poll interval", options.poll_interval),
    ] {
        if value.is_zero() {
            return Err(config::invalid(format!("{name} must be greater than zero")));
        }
    }
    for required in [defaults::AGENT_COMPONENT, defaults::CERT_MANAGER_COMPONENT] {
        if !options.components.iter().any(|c| c == required) {
            return Err(config::invalid(format!("component list must include {required}")));
        }
    }
    if options.provider == ProviderKind::Gitea && options.hostname.is_none() {
        return Err(config::invalid("gitea requires a hostname"));
    }
    Ok(())
}
