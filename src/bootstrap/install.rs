//! Per-component install steps of a bootstrap run.

use super::Bootstrap;
use crate::agent::{AgentInstaller, AgentOptions};
use crate::certs::{self, CertManagerRequest};
use crate::deadline::Deadline;
use crate::defaults::{AGENT_NAMESPACE, COMPONENT_IMAGE_HOST, COMPONENT_NAMESPACES, manifest_resource_name};
use crate::error::{Result, resolve};
use crate::extract::{ResourceBundle, extract};
use crate::localize::Localizer;
use crate::provider::ManagementRepository;
use crate::publish::{CommitResult, NamespaceBookkeeping, PublishRequest, Publisher};
use crate::resolver::{ComponentReference, lookup_matching};
use crate::temp::ScratchDir;

/// Namespace a controller component is installed into.
pub fn component_namespace(name: &str) -> Result<&'static str> {
    COMPONENT_NAMESPACES
        .iter()
        .find(|(component, _)| *component == name)
        .map(|(_, namespace)| *namespace)
        .ok_or_else(|| resolve::unknown_component(name))
}

impl Bootstrap {
    /// Resolves `reference` and reads its manifest, localization and images.
    fn fetch_bundle(&self, deadline: &Deadline, reference: &ComponentReference) -> Result<ResourceBundle> {
        let repository = self.registry.as_repository();
        let descriptor = lookup_matching(
            deadline,
            repository,
            &reference.component_name,
            &reference.version,
        )?;
        extract(
            deadline,
            repository,
            &descriptor,
            &manifest_resource_name(&reference.name),
        )
    }

    fn cert_manager_request(&self) -> CertManagerRequest<'_> {
        CertManagerRequest {
            branch: &self.options.default_branch,
            target_path: &self.options.target_path,
            appendix: self.options.appendix(),
        }
    }

    pub(super) fn install_agent(
        &self,
        deadline: &Deadline,
        repository: &ManagementRepository,
        reference: &ComponentReference,
    ) -> Result<CommitResult> {
        let bundle = self.fetch_bundle(deadline, reference)?;
        let clone_url = self.clone_url(repository);
        let options = AgentOptions {
            namespace: AGENT_NAMESPACE.to_string(),
            branch: self.options.default_branch.clone(),
            target_path: self.options.target_path.clone(),
            url: self.options.test_url.clone().unwrap_or_else(|| clone_url.clone()),
            token: self.options.token.clone(),
            ca_bundle: self.read_ca_bundle()?,
            interval: self.options.interval,
            timeout: self.options.timeout,
            poll_interval: self.options.poll_interval,
            appendix: self.options.commit_message_appendix.clone(),
        };
        let mut checkout = (self.checkout)(&clone_url, &self.options.token)?;
        AgentInstaller::new(self.cluster.as_ref(), checkout.as_mut(), &options).install(deadline, &bundle)
    }

    pub(super) fn install_cert_manager(
        &self,
        deadline: &Deadline,
        repository: &ManagementRepository,
        reference: &ComponentReference,
        bookkeeping: NamespaceBookkeeping,
    ) -> Result<(CommitResult, NamespaceBookkeeping)> {
        let bundle = self.fetch_bundle(deadline, reference)?;
        let publisher = Publisher::new(self.provider.as_ref(), repository);
        certs::install_cert_manager(deadline, &publisher, self.cert_manager_request(), &bundle, bookkeeping)
    }

    pub(super) fn install_component(
        &self,
        deadline: &Deadline,
        repository: &ManagementRepository,
        name: &str,
        reference: &ComponentReference,
        bookkeeping: NamespaceBookkeeping,
    ) -> Result<(CommitResult, NamespaceBookkeeping)> {
        let namespace = component_namespace(name)?;
        let bundle = self.fetch_bundle(deadline, reference)?;
        let rendered = Localizer::new(COMPONENT_IMAGE_HOST)
            .localize(&bundle, ScratchDir::new(&format!("{name}-install"))?)?;
        let publisher = Publisher::new(self.provider.as_ref(), repository);
        publisher.publish(
            deadline,
            &PublishRequest {
                branch: &self.options.default_branch,
                target_path: &self.options.target_path,
                namespace,
                component_name: &bundle.component,
                version: &bundle.version,
                content: &rendered,
                appendix: self.options.appendix(),
            },
            bookkeeping,
            name,
        )
    }

    pub(super) fn publish_certificates(
        &self,
        deadline: &Deadline,
        repository: &ManagementRepository,
        bookkeeping: &NamespaceBookkeeping,
    ) -> Result<CommitResult> {
        let publisher = Publisher::new(self.provider.as_ref(), repository);
        certs::publish_certificates(deadline, &publisher, self.cert_manager_request(), bookkeeping)
    }
}
