//! Certificate authority install
//!
//! cert-manager is published like any other component. Once every component
//! is in place a single commit adds a self-signed `ClusterIssuer` and one
//! `Certificate` per namespace that received components.

use serde_json::json;

use crate::deadline::Deadline;
use crate::defaults::{CERT_MANAGER_IMAGE_HOST, CERT_MANAGER_NAMESPACE};
use crate::error::Result;
use crate::extract::ResourceBundle;
use crate::localize::Localizer;
use crate::manifest;
use crate::publish::{
    CommitResult, NamespaceBookkeeping, PublishRequest, Publisher, commit_message, repository_path,
};
use crate::temp::ScratchDir;

pub const CLUSTER_ISSUER: &str = "groundwork-bootstrap-issuer";
pub const CLUSTER_ISSUER_FILE: &str = "cluster_issuer.yaml";
pub const CERTIFICATE_FILE: &str = "certificate.yaml";

/// Localizes and publishes cert-manager into its own namespace.
pub fn install_cert_manager(
    deadline: &Deadline,
    publisher: &Publisher<'_>,
    request: CertManagerRequest<'_>,
    bundle: &ResourceBundle,
    bookkeeping: NamespaceBookkeeping,
) -> Result<(CommitResult, NamespaceBookkeeping)> {
    let rendered = Localizer::new(CERT_MANAGER_IMAGE_HOST)
        .localize(bundle, ScratchDir::new("cert-manager-install")?)?;
    publisher.publish(
        deadline,
        &PublishRequest {
            branch: request.branch,
            target_path: request.target_path,
            namespace: CERT_MANAGER_NAMESPACE,
            component_name: &bundle.component,
            version: &bundle.version,
            content: &rendered,
            appendix: request.appendix,
        },
        bookkeeping,
        crate::defaults::CERT_MANAGER_COMPONENT,
    )
}

#[derive(Debug, Clone, Copy)]
pub struct CertManagerRequest<'a> {
    pub branch: &'a str,
    pub target_path: &'a str,
    pub appendix: Option<&'a str>,
}

/// Commits the issuer and the namespace certificates in one commit.
///
/// cert-manager's own namespace gets no certificate.
pub fn publish_certificates(
    deadline: &Deadline,
    publisher: &Publisher<'_>,
    request: CertManagerRequest<'_>,
    bookkeeping: &NamespaceBookkeeping,
) -> Result<CommitResult> {
    let mut files = vec![(
        repository_path(&[request.target_path, CERT_MANAGER_NAMESPACE, CLUSTER_ISSUER_FILE]),
        manifest::to_yaml(&[cluster_issuer()?])?.into_bytes(),
    )];
    for namespace in bookkeeping
        .namespaces()
        .filter(|ns| *ns != CERT_MANAGER_NAMESPACE)
    {
        files.push((
            repository_path(&[request.target_path, namespace, CERTIFICATE_FILE]),
            manifest::to_yaml(&[certificate(namespace)?])?.into_bytes(),
        ));
    }

    let message = commit_message("Add cluster issuer and namespace certificates", request.appendix);
    let result = publisher.commit(deadline, request.branch, &message, &files)?;
    tracing::info!(files = files.len(), sha = %result.sha, "published certificates");
    Ok(result)
}

pub fn cluster_issuer() -> Result<serde_yaml::Value> {
    Ok(serde_yaml::to_value(json!({
        "apiVersion": "cert-manager.io/v1",
        "kind": "ClusterIssuer",
        "metadata": {"name": CLUSTER_ISSUER},
        "spec": {"selfSigned": {}},
    }))?)
}

/// A CA certificate for the services in `namespace`.
pub fn certificate(namespace: &str) -> Result<serde_yaml::Value> {
    Ok(serde_yaml::to_value(json!({
        "apiVersion": "cert-manager.io/v1",
        "kind": "Certificate",
        "metadata": {
            "name": format!("{namespace}-certificate"),
            "namespace": namespace,
        },
        "spec": {
            "isCA": true,
            "secretName": format!("{namespace}-tls"),
            "dnsNames": [
                format!("*.{namespace}.svc.cluster.local"),
                "localhost",
            ],
            "ipAddresses": ["127.0.0.1", "::1"],
            "privateKey": {"algorithm": "RSA", "encoding": "PKCS8", "size": 2048},
            "issuerRef": {
                "name": CLUSTER_ISSUER,
                "kind": "ClusterIssuer",
                "group": "cert-manager.io",
            },
        },
    }))?)
}
