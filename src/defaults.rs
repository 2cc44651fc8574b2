//! Fixed names, hosts and intervals shared by the bootstrap stages

use std::time::Duration;

/// Component carrying references to every installable component.
pub const BOOTSTRAP_COMPONENT: &str = "ocm.software/mpas/bootstrap";

/// Registry the bootstrap component is published to.
pub const DEFAULT_REGISTRY: &str = "ghcr.io/open-component-model/mpas-bootstrap-component";

/// Registry host the controller manifests refer to before localization.
pub const COMPONENT_IMAGE_HOST: &str = "ghcr.io/open-component-model";

/// Registry host the reconciliation agent manifests refer to before localization.
pub const AGENT_IMAGE_HOST: &str = "ghcr.io/fluxcd";

/// Registry host the cert-manager manifests refer to before localization.
pub const CERT_MANAGER_IMAGE_HOST: &str = "quay.io/jetstack";

/// Name of the resource holding the localization descriptor.
pub const LOCALIZATION_RESOURCE: &str = "ocm-config";

/// Resource type marking a container image reference.
pub const IMAGE_RESOURCE_TYPE: &str = "ociImage";

pub const AGENT_COMPONENT: &str = "flux";
pub const CERT_MANAGER_COMPONENT: &str = "cert-manager";

pub const AGENT_NAMESPACE: &str = "flux-system";
pub const CERT_MANAGER_NAMESPACE: &str = "cert-manager";
pub const OCM_NAMESPACE: &str = "ocm-system";
pub const MPAS_NAMESPACE: &str = "mpas-system";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_DESCRIPTION: &str = "Management repository for the component model";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_VISIBILITY: &str = "private";
pub const DEFAULT_TRANSPORT: &str = "https";
pub const DEFAULT_TARGET_PATH: &str = ".";

/// Controllers installed after the agent and cert-manager, with their namespaces.
pub const COMPONENT_NAMESPACES: &[(&str, &str)] = &[
    ("git-controller", OCM_NAMESPACE),
    ("mpas-product-controller", MPAS_NAMESPACE),
    ("mpas-project-controller", MPAS_NAMESPACE),
    ("ocm-controller", OCM_NAMESPACE),
    ("replication-controller", OCM_NAMESPACE),
];

/// Deployments cert-manager runs once installed.
pub const CERT_MANAGER_WORKLOADS: &[&str] =
    &["cert-manager", "cert-manager-cainjector", "cert-manager-webhook"];

/// Every component name a bootstrap run installs by default.
pub fn all_components() -> Vec<String> {
    let mut names = vec![
        AGENT_COMPONENT.to_string(),
        CERT_MANAGER_COMPONENT.to_string(),
    ];
    names.extend(COMPONENT_NAMESPACES.iter().map(|(name, _)| (*name).to_string()));
    names
}

/// Name of the resource carrying a component's manifest bundle.
///
/// The agent and cert-manager ship their bundle under the component's own
/// name, controllers under `<name>-file`.
pub fn manifest_resource_name(component: &str) -> String {
    match component {
        AGENT_COMPONENT | CERT_MANAGER_COMPONENT => component.to_string(),
        other => format!("{other}-file"),
    }
}
