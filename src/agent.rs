//! Reconciliation agent install
//!
//! The agent cannot fetch its own manifests before it runs, so this is the
//! one install that also writes to the cluster directly:
//! 1. the localized agent manifests are committed through a local clone and,
//!    when the agent is not running yet, applied;
//! 2. the source secret holding the repository token is applied (it never
//!    reaches the repository);
//! 3. the sync manifests pointing the agent at the management repository are
//!    committed and applied;
//! 4. the sync object and the agent's own workloads are waited for.

use std::time::Duration;

use serde_json::json;

use crate::cluster::{ClusterClient, ObjectKey, WatchedKind};
use crate::converge::Poller;
use crate::deadline::Deadline;
use crate::defaults::AGENT_IMAGE_HOST;
use crate::error::{Result, converge};
use crate::extract::ResourceBundle;
use crate::git::Checkout;
use crate::localize::{Kustomization, Localizer};
use crate::manifest;
use crate::publish::{CommitResult, commit_message, repository_path};
use crate::temp::ScratchDir;

pub const COMPONENTS_FILE: &str = "gotk-components.yaml";
pub const SYNC_FILE: &str = "gotk-sync.yaml";
pub const SOURCE_SECRET_USERNAME: &str = "git";

const SOURCE_API_VERSION: &str = "source.toolkit.fluxcd.io/v1";
const KUSTOMIZE_API_VERSION: &str = "kustomize.toolkit.fluxcd.io/v1";
const KUSTOMIZATION_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Namespace the agent runs in; also the name of its sync objects and secret.
    pub namespace: String,
    pub branch: String,
    pub target_path: String,
    /// Repository URL the agent fetches from.
    pub url: String,
    pub token: String,
    pub ca_bundle: Option<Vec<u8>>,
    /// How often the agent fetches the repository.
    pub interval: Duration,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub appendix: Option<String>,
}

impl AgentOptions {
    pub fn sync_key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.namespace)
    }

    fn path(&self, file: &str) -> String {
        repository_path(&[&self.target_path, &self.namespace, file])
    }
}

pub struct AgentInstaller<'a> {
    cluster: &'a dyn ClusterClient,
    checkout: &'a mut dyn Checkout,
    options: &'a AgentOptions,
}

impl<'a> AgentInstaller<'a> {
    pub fn new(
        cluster: &'a dyn ClusterClient,
        checkout: &'a mut dyn Checkout,
        options: &'a AgentOptions,
    ) -> Self {
        Self {
            cluster,
            checkout,
            options,
        }
    }

    /// Installs the agent from `bundle` and waits until it reports healthy.
    ///
    /// Returns the commit carrying the sync manifests.
    pub fn install(&mut self, deadline: &Deadline, bundle: &ResourceBundle) -> Result<CommitResult> {
        let rendered = Localizer::new(AGENT_IMAGE_HOST).localize(bundle, ScratchDir::new("flux-install")?)?;

        let message = commit_message(
            &format!("Add Flux {} component manifests", bundle.version),
            self.options.appendix.as_deref(),
        );
        let components = self.checkout.commit_and_push(
            deadline,
            &self.options.branch,
            &message,
            &[(self.options.path(COMPONENTS_FILE), rendered.clone().into_bytes())],
        )?;
        tracing::info!(version = %bundle.version, sha = components.sha(), "committed agent manifests");

        if self.must_apply_components(deadline)? {
            self.cluster
                .apply(deadline, &manifest::parse_documents(rendered.as_bytes())?)?;
            tracing::info!(namespace = %self.options.namespace, "applied agent manifests");
        }

        self.cluster
            .apply(deadline, &[source_secret(self.options)?])?;

        let sync = sync_manifests(self.options)?;
        let message = commit_message("Add Flux sync manifests", self.options.appendix.as_deref());
        let committed = self.checkout.commit_and_push(
            deadline,
            &self.options.branch,
            &message,
            &[
                (self.options.path(SYNC_FILE), manifest::to_yaml(&sync)?.into_bytes()),
                (
                    self.options.path(crate::localize::overlay::KUSTOMIZATION_FILE),
                    directory_kustomization()?.into_bytes(),
                ),
            ],
        )?;
        self.cluster.apply(deadline, &sync)?;

        let result = CommitResult {
            sha: committed.sha().to_string(),
        };
        self.wait_healthy(deadline, &result, &bundle.image_names)?;
        Ok(result)
    }

    /// The agent has to be applied by hand until its sync object has applied
    /// a revision at least once.
    fn must_apply_components(&self, deadline: &Deadline) -> Result<bool> {
        let status = self
            .cluster
            .sync_status(deadline, WatchedKind::Kustomization, &self.options.sync_key())?;
        Ok(status.is_none_or(|s| s.applied_revision.as_deref().is_none_or(str::is_empty)))
    }

    /// Waits for the sync object and the agent workloads; failures of both
    /// are reported together.
    fn wait_healthy(&self, deadline: &Deadline, commit: &CommitResult, workloads: &[String]) -> Result<()> {
        let poller = Poller::new(self.cluster, self.options.poll_interval);
        let mut errors = Vec::new();
        if let Err(err) = poller.sync(
            deadline,
            &self.options.sync_key(),
            &self.options.branch,
            &commit.sha,
            self.options.timeout,
        ) {
            errors.push(err);
        }
        if let Err(err) = poller.wait_for_workloads(&self.options.namespace, workloads, self.options.timeout) {
            errors.push(err);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(converge::combined(errors))
        }
    }
}

/// The secret the agent authenticates to the repository with.
pub fn source_secret(options: &AgentOptions) -> Result<serde_yaml::Value> {
    let mut data = json!({
        "username": SOURCE_SECRET_USERNAME,
        "password": options.token,
    });
    if let Some(ca) = &options.ca_bundle {
        data["ca.crt"] = json!(String::from_utf8_lossy(ca));
    }
    Ok(serde_yaml::to_value(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": options.namespace,
            "namespace": options.namespace,
        },
        "stringData": data,
    }))?)
}

/// The source and sync objects pointing the agent at the repository.
pub fn sync_manifests(options: &AgentOptions) -> Result<Vec<serde_yaml::Value>> {
    let path = match repository_path(&[&options.target_path]) {
        p if p.is_empty() => "./".to_string(),
        p => format!("./{p}"),
    };
    let source = json!({
        "apiVersion": SOURCE_API_VERSION,
        "kind": WatchedKind::GitRepository.as_str(),
        "metadata": {"name": options.namespace, "namespace": options.namespace},
        "spec": {
            "interval": go_duration(options.interval),
            "ref": {"branch": options.branch},
            "secretRef": {"name": options.namespace},
            "url": options.url,
        },
    });
    let sync = json!({
        "apiVersion": KUSTOMIZE_API_VERSION,
        "kind": WatchedKind::Kustomization.as_str(),
        "metadata": {"name": options.namespace, "namespace": options.namespace},
        "spec": {
            "interval": go_duration(KUSTOMIZATION_INTERVAL),
            "path": path,
            "prune": true,
            "sourceRef": {"kind": WatchedKind::GitRepository.as_str(), "name": options.namespace},
        },
    });
    Ok(vec![serde_yaml::to_value(source)?, serde_yaml::to_value(sync)?])
}

fn directory_kustomization() -> Result<String> {
    let kustomization = Kustomization::new(vec![COMPONENTS_FILE.to_string(), SYNC_FILE.to_string()]);
    Ok(serde_yaml::to_string(&kustomization)?)
}

/// Formats an interval the way the agent's API expects it (`5m0s`).
pub fn go_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
