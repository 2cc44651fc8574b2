//! Bootstrap orchestration
//!
//! A run moves through fixed stages, each gated on the previous one:
//!
//! ```text
//! ReconcileRepository -> [TransferArchive] -> FetchReferences -> InstallAgent
//!   -> InstallCertManager -> WaitHealthy -> InstallComponent(..) (sorted by name)
//!   -> GenerateCertificates -> WaitHealthy -> WaitWorkloads -> Done
//! ```
//!
//! The first failing stage aborts the run; its error is wrapped with the
//! stage name. Nothing is rolled back; [`delete_management_repository`] is a
//! separate operation.
//!
//! Repository reconciliation, archive transfer and reference fetching share
//! one deadline of `timeout`. Every later stage gets its own, and every
//! health wait its own poll timeout.

mod install;

use std::collections::BTreeMap;
use std::fmt;

use crate::cluster::ClusterClient;
use crate::config::BootstrapOptions;
use crate::converge::Poller;
use crate::deadline::Deadline;
use crate::defaults::{
    AGENT_COMPONENT, AGENT_NAMESPACE, BOOTSTRAP_COMPONENT, CERT_MANAGER_COMPONENT,
    CERT_MANAGER_NAMESPACE, CERT_MANAGER_WORKLOADS,
};
use crate::error::{Result, config, converge, fs, resolve};
use crate::git::{Checkout, LocalCheckout};
use crate::progress::{ProgressReporter, SilentReporter};
use crate::provider::{GitProvider, ManagementRepository, RepositorySpec};
use crate::publish::{CommitResult, NamespaceBookkeeping};
use crate::registry::Registry;
use crate::registry::archive::TransportArchive;
use crate::registry::transfer::transfer;
use crate::resolver::{self, ComponentReference};

pub use install::component_namespace;

/// Opens a working copy of the repository at a URL with a token.
pub type CheckoutFactory = Box<dyn Fn(&str, &str) -> Result<Box<dyn Checkout>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    ReconcileRepository,
    TransferArchive,
    FetchReferences,
    InstallAgent,
    InstallCertManager,
    WaitHealthy,
    InstallComponent(String),
    GenerateCertificates,
    WaitWorkloads,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ReconcileRepository => f.write_str("reconcile management repository"),
            Stage::TransferArchive => f.write_str("transfer archive"),
            Stage::FetchReferences => f.write_str("fetch component references"),
            Stage::InstallAgent => f.write_str("install reconciliation agent"),
            Stage::InstallCertManager => f.write_str("install cert-manager"),
            Stage::WaitHealthy => f.write_str("wait for reconciliation"),
            Stage::InstallComponent(name) => write!(f, "install {name}"),
            Stage::GenerateCertificates => f.write_str("generate certificate manifests"),
            Stage::WaitWorkloads => f.write_str("wait for components"),
            Stage::Done => f.write_str("done"),
        }
    }
}

pub struct Bootstrap {
    options: BootstrapOptions,
    provider: Box<dyn GitProvider>,
    registry: Box<dyn Registry>,
    cluster: Box<dyn ClusterClient>,
    checkout: CheckoutFactory,
    reporter: Box<dyn ProgressReporter>,
    repository: Option<ManagementRepository>,
    trace: Vec<Stage>,
}

impl Bootstrap {
    pub fn new(
        options: BootstrapOptions,
        provider: Box<dyn GitProvider>,
        registry: Box<dyn Registry>,
        cluster: Box<dyn ClusterClient>,
    ) -> Self {
        Self {
            options,
            provider,
            registry,
            cluster,
            checkout: Box::new(|url, token| Ok(Box::new(LocalCheckout::new(url, token)?))),
            reporter: Box::new(SilentReporter),
            repository: None,
            trace: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn with_checkout(mut self, checkout: CheckoutFactory) -> Self {
        self.checkout = checkout;
        self
    }

    pub fn options(&self) -> &BootstrapOptions {
        &self.options
    }

    /// Stages entered so far, in order.
    pub fn trace(&self) -> &[Stage] {
        &self.trace
    }

    pub fn repository(&self) -> Option<&ManagementRepository> {
        self.repository.as_ref()
    }

    pub fn repository_spec(&self) -> RepositorySpec {
        repository_spec(&self.options)
    }

    pub fn run(&mut self) -> Result<()> {
        tracing::info!(
            provider = self.provider.kind().as_str(),
            owner = %self.options.owner,
            repository = %self.options.repository_name,
            "starting bootstrap"
        );
        let outer = Deadline::after(self.options.timeout);

        let spec = self.repository_spec();
        let repository = self.stage(
            Stage::ReconcileRepository,
            format!("Preparing management repository {}", spec.name),
            outer,
            |b, deadline| b.provider.reconcile_repository(deadline, &spec),
        )?;
        self.repository = Some(repository.clone());

        if let Some(path) = self.options.from_file.clone() {
            self.stage(
                Stage::TransferArchive,
                format!("Transferring bootstrap component from {}", path.display()),
                outer,
                |b, deadline| {
                    let archive = TransportArchive::open(&path)?;
                    let summary = transfer(deadline, &archive, b.registry.as_store())?;
                    tracing::info!(artifacts = summary.artifacts, "transferred archive");
                    Ok(())
                },
            )?;
        }

        let mut refs = self.stage(
            Stage::FetchReferences,
            format!("Fetching bootstrap component from {}", self.options.registry),
            outer,
            |b, deadline| {
                resolver::resolve(
                    deadline,
                    b.registry.as_repository(),
                    BOOTSTRAP_COMPONENT,
                    &b.options.components,
                )
            },
        )?;

        let agent = take_reference(&mut refs, AGENT_COMPONENT)?;
        self.stage(
            Stage::InstallAgent,
            format!("Installing {AGENT_COMPONENT} with version {}", agent.version),
            self.stage_deadline(),
            |b, deadline| b.install_agent(deadline, &repository, &agent),
        )?;

        let cert_manager = take_reference(&mut refs, CERT_MANAGER_COMPONENT)?;
        let (commit, mut bookkeeping) = self.stage(
            Stage::InstallCertManager,
            format!("Installing {CERT_MANAGER_COMPONENT} with version {}", cert_manager.version),
            self.stage_deadline(),
            |b, deadline| {
                b.install_cert_manager(deadline, &repository, &cert_manager, NamespaceBookkeeping::default())
            },
        )?;

        self.stage(
            Stage::WaitHealthy,
            "Waiting for cert-manager to be available".to_string(),
            self.stage_deadline(),
            |b, deadline| {
                b.sync(deadline, &commit)?;
                let workloads: Vec<String> = CERT_MANAGER_WORKLOADS.iter().map(ToString::to_string).collect();
                b.poller()
                    .wait_for_workloads(CERT_MANAGER_NAMESPACE, &workloads, b.options.timeout)
            },
        )?;

        // BTreeMap iteration keeps the remaining installs in name order.
        for (name, reference) in &refs {
            let (_, next) = self.stage(
                Stage::InstallComponent(name.clone()),
                format!("Generating {name} manifest with version {}", reference.version),
                self.stage_deadline(),
                |b, deadline| b.install_component(deadline, &repository, name, reference, bookkeeping),
            )?;
            bookkeeping = next;
        }

        let latest = self.stage(
            Stage::GenerateCertificates,
            "Generating certificate manifests".to_string(),
            self.stage_deadline(),
            |b, deadline| b.publish_certificates(deadline, &repository, &bookkeeping),
        )?;

        self.stage(
            Stage::WaitHealthy,
            "Reconciling infrastructure components".to_string(),
            self.stage_deadline(),
            |b, deadline| b.sync(deadline, &latest),
        )?;

        self.stage(
            Stage::WaitWorkloads,
            "Waiting for components to be ready".to_string(),
            self.stage_deadline(),
            |b, _| b.wait_for_components(&bookkeeping),
        )?;

        self.trace.push(Stage::Done);
        tracing::info!(repository = %repository.full_path, sha = %latest.sha, "bootstrap completed");
        Ok(())
    }

    /// Deletes the management repository, looking it up when this run has
    /// not reconciled it.
    pub fn delete_management_repository(&mut self) -> Result<()> {
        let deadline = Deadline::after(self.options.timeout);
        match self.repository.take() {
            Some(repository) => {
                self.provider.delete_repository(&deadline, &repository)?;
                tracing::info!(repository = %repository.full_path, "deleted management repository");
                Ok(())
            }
            None => delete_management_repository(self.provider.as_ref(), &self.repository_spec(), &deadline),
        }
    }

    fn stage<T>(
        &mut self,
        stage: Stage,
        message: String,
        deadline: Deadline,
        run: impl FnOnce(&Self, &Deadline) -> Result<T>,
    ) -> Result<T> {
        tracing::debug!(stage = %stage, "entering stage");
        self.trace.push(stage.clone());
        self.reporter.begin(&message);
        match run(self, &deadline) {
            Ok(value) => {
                self.reporter.success(&message);
                Ok(value)
            }
            Err(err) => {
                self.reporter.fail(&message);
                tracing::warn!(stage = %stage, error = %err, "stage failed");
                Err(converge::stage(stage.to_string(), err))
            }
        }
    }

    fn stage_deadline(&self) -> Deadline {
        Deadline::after(self.options.timeout)
    }

    fn poller(&self) -> Poller<'_> {
        Poller::new(self.cluster.as_ref(), self.options.poll_interval)
    }

    /// Reconciles the agent's sync objects up to `commit`.
    fn sync(&self, deadline: &Deadline, commit: &CommitResult) -> Result<()> {
        let key = crate::cluster::ObjectKey::new(AGENT_NAMESPACE, AGENT_NAMESPACE);
        self.poller().sync(
            deadline,
            &key,
            &self.options.default_branch,
            &commit.sha,
            self.options.timeout,
        )
    }

    /// Waits for every installed component; failures from all namespaces
    /// are reported together.
    fn wait_for_components(&self, bookkeeping: &NamespaceBookkeeping) -> Result<()> {
        let poller = self.poller();
        let errors: Vec<_> = bookkeeping
            .namespaces()
            .filter(|ns| *ns != CERT_MANAGER_NAMESPACE)
            .filter_map(|ns| {
                poller
                    .wait_for_workloads(ns, bookkeeping.components(ns), self.options.timeout)
                    .err()
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(converge::combined(errors))
        }
    }

    fn read_ca_bundle(&self) -> Result<Option<Vec<u8>>> {
        self.options
            .ca_file
            .as_deref()
            .map(|path| std::fs::read(path).map_err(|e| fs::read_failed(path, e)))
            .transpose()
    }

    /// The URL the working copy and the agent use.
    fn clone_url(&self, repository: &ManagementRepository) -> String {
        if self.options.transport == "http" {
            repository.clone_url.replacen("https://", "http://", 1)
        } else {
            repository.clone_url.clone()
        }
    }
}

pub fn repository_spec(options: &BootstrapOptions) -> RepositorySpec {
    RepositorySpec {
        owner: options.owner.clone(),
        name: options.repository_name.clone(),
        personal: options.personal,
        description: options.description.clone(),
        default_branch: options.default_branch.clone(),
        visibility: options.visibility.clone(),
    }
}

/// Finds the repository described by `spec` and deletes it.
pub fn delete_management_repository(
    provider: &dyn GitProvider,
    spec: &RepositorySpec,
    deadline: &Deadline,
) -> Result<()> {
    let repository = provider.find_repository(deadline, spec)?.ok_or_else(|| {
        config::invalid(format!(
            "management repository {}/{} does not exist",
            spec.owner, spec.name
        ))
    })?;
    provider.delete_repository(deadline, &repository)?;
    tracing::info!(repository = %repository.full_path, "deleted management repository");
    Ok(())
}

fn take_reference(
    refs: &mut BTreeMap<String, ComponentReference>,
    name: &str,
) -> Result<ComponentReference> {
    refs.remove(name)
        .ok_or_else(|| resolve::reference_not_found(BOOTSTRAP_COMPONENT, name))
}
