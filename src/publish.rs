//! Publishing rendered manifests to the management repository
//!
//! Each component lands in `<target>/<namespace>/<short-name>.yaml`. The
//! first component published into a namespace keeps its `Namespace` object;
//! later ones have it stripped so the namespace is declared exactly once.

use std::collections::BTreeMap;

use crate::deadline::Deadline;
use crate::error::Result;
use crate::manifest;
use crate::provider::{CommitFile, GitProvider, ManagementRepository};

/// Components committed so far, by namespace.
///
/// Returned by every publish and handed to the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceBookkeeping {
    namespaces: BTreeMap<String, Vec<String>>,
}

impl NamespaceBookkeeping {
    pub fn has_components(&self, namespace: &str) -> bool {
        self.namespaces.get(namespace).is_some_and(|c| !c.is_empty())
    }

    #[must_use]
    pub fn record(mut self, namespace: &str, component: &str) -> Self {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .push(component.to_string());
        self
    }

    pub fn components(&self, namespace: &str) -> &[String] {
        self.namespaces.get(namespace).map_or(&[], Vec::as_slice)
    }

    /// Namespaces that received at least one component, sorted.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }
}

/// The commit a publish produced or found already in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub sha: String,
}

/// One component's rendered manifest.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub branch: &'a str,
    pub target_path: &'a str,
    pub namespace: &'a str,
    /// Registry identity, e.g. `ocm.software/ocm-controller`.
    pub component_name: &'a str,
    pub version: &'a str,
    pub content: &'a str,
    pub appendix: Option<&'a str>,
}

pub struct Publisher<'a> {
    provider: &'a dyn GitProvider,
    repository: &'a ManagementRepository,
}

impl<'a> Publisher<'a> {
    pub fn new(provider: &'a dyn GitProvider, repository: &'a ManagementRepository) -> Self {
        Self {
            provider,
            repository,
        }
    }

    /// Commits one component and records it under its namespace.
    ///
    /// Content identical to the branch head is not an error; the head commit
    /// is returned instead.
    pub fn publish(
        &self,
        deadline: &Deadline,
        request: &PublishRequest<'_>,
        bookkeeping: NamespaceBookkeeping,
        component: &str,
    ) -> Result<(CommitResult, NamespaceBookkeeping)> {
        let content = if bookkeeping.has_components(request.namespace) {
            let objects = manifest::parse_documents(request.content.as_bytes())?;
            manifest::to_yaml(&manifest::strip_namespace(objects, request.namespace))?
        } else {
            request.content.to_string()
        };

        let short_name = request
            .component_name
            .rsplit('/')
            .next()
            .unwrap_or(request.component_name);
        let path = repository_path(&[
            request.target_path,
            request.namespace,
            &format!("{short_name}.yaml"),
        ]);
        let message = commit_message(
            &format!("Add {} {} manifests", request.component_name, request.version),
            request.appendix,
        );

        let result = self.commit(deadline, request.branch, &message, &[(path, content.into_bytes())])?;
        tracing::info!(
            component = request.component_name,
            version = request.version,
            namespace = request.namespace,
            sha = %result.sha,
            "published manifests"
        );
        Ok((result, bookkeeping.record(request.namespace, component)))
    }

    /// Commits `files` (path, raw content) in a single commit.
    pub fn commit(
        &self,
        deadline: &Deadline,
        branch: &str,
        message: &str,
        files: &[(String, Vec<u8>)],
    ) -> Result<CommitResult> {
        let kind = self.repository.provider;
        let files: Vec<CommitFile> = files
            .iter()
            .map(|(path, content)| CommitFile {
                path: path.clone(),
                content: kind.encode_content(content),
            })
            .collect();
        let outcome = self
            .provider
            .create_commit(deadline, self.repository, branch, message, &files)?;
        Ok(CommitResult {
            sha: outcome.sha().to_string(),
        })
    }
}

/// Joins path segments, dropping empty and `.` segments and stray slashes.
pub fn repository_path(segments: &[&str]) -> String {
    segments
        .iter()
        .flat_map(|s| s.split('/'))
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// `subject`, followed by `appendix` as its own paragraph.
pub fn commit_message(subject: &str, appendix: Option<&str>) -> String {
    match appendix.map(str::trim).filter(|a| !a.is_empty()) {
        Some(appendix) => format!("{subject}\n\n{appendix}"),
        None => subject.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderKind, RepositorySpec};
    use crate::testing::FakeProvider;

    const OCM_CONTROLLER: &str = r"apiVersion: v1
kind: Namespace
metadata:
  name: ocm-system
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: ocm-controller
  namespace: ocm-system
";

    const GIT_CONTROLLER: &str = r"apiVersion: v1
kind: Namespace
metadata:
  name: ocm-system
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: git-controller
  namespace: ocm-system
";

    fn setup(kind: ProviderKind) -> (FakeProvider, ManagementRepository) {
        let provider = FakeProvider::new(kind);
        let repository = provider
            .reconcile_repository(
                &Deadline::none(),
                &RepositorySpec {
                    owner: "acme".into(),
                    name: "management".into(),
                    personal: false,
                    description: "test".into(),
                    default_branch: "main".into(),
                    visibility: "private".into(),
                },
            )
            .unwrap();
        (provider, repository)
    }

    fn request<'a>(component_name: &'a str, content: &'a str) -> PublishRequest<'a> {
        PublishRequest {
            branch: "main",
            target_path: "./clusters/dev",
            namespace: "ocm-system",
            component_name,
            version: "v0.5.0",
            content,
            appendix: None,
        }
    }

    #[test]
    fn test_repository_path() {
        assert_eq!(repository_path(&[".", "ocm-system", "x.yaml"]), "ocm-system/x.yaml");
        assert_eq!(
            repository_path(&["./clusters/dev/", "flux-system", "gotk-sync.yaml"]),
            "clusters/dev/flux-system/gotk-sync.yaml"
        );
    }

    #[test]
    fn test_commit_message_appendix() {
        assert_eq!(commit_message("Add x v1 manifests", None), "Add x v1 manifests");
        assert_eq!(
            commit_message("Add x v1 manifests", Some("[skip ci]")),
            "Add x v1 manifests\n\n[skip ci]"
        );
        assert_eq!(commit_message("subject", Some("  ")), "subject");
    }

    #[test]
    fn test_publish_writes_component_file() {
        let (provider, repository) = setup(ProviderKind::GitHub);
        let publisher = Publisher::new(&provider, &repository);
        let mut req = request("ocm.software/ocm-controller", OCM_CONTROLLER);
        req.appendix = Some("[ci skip]");

        let (result, bookkeeping) = publisher
            .publish(&Deadline::none(), &req, NamespaceBookkeeping::default(), "ocm-controller")
            .unwrap();
        assert_eq!(result.sha, provider.head("main"));
        assert_eq!(
            provider.file("main", "clusters/dev/ocm-system/ocm-controller.yaml").as_deref(),
            Some(OCM_CONTROLLER)
        );
        assert_eq!(
            provider.last_message().as_deref(),
            Some("Add ocm.software/ocm-controller v0.5.0 manifests\n\n[ci skip]")
        );
        assert_eq!(bookkeeping.components("ocm-system"), ["ocm-controller"]);
    }

    #[test]
    fn test_publish_identical_content_is_idempotent() {
        let (provider, repository) = setup(ProviderKind::GitHub);
        let publisher = Publisher::new(&provider, &repository);
        let req = request("ocm.software/ocm-controller", OCM_CONTROLLER);

        let (first, _) = publisher
            .publish(&Deadline::none(), &req, NamespaceBookkeeping::default(), "ocm-controller")
            .unwrap();
        let (second, _) = publisher
            .publish(&Deadline::none(), &req, NamespaceBookkeeping::default(), "ocm-controller")
            .unwrap();
        assert_eq!(first.sha, second.sha);
        assert_eq!(provider.commit_count(), 1);
    }

    #[test]
    fn test_second_component_in_namespace_drops_namespace_object() {
        let (provider, repository) = setup(ProviderKind::GitHub);
        let publisher = Publisher::new(&provider, &repository);

        let (_, bookkeeping) = publisher
            .publish(
                &Deadline::none(),
                &request("ocm.software/ocm-controller", OCM_CONTROLLER),
                NamespaceBookkeeping::default(),
                "ocm-controller",
            )
            .unwrap();
        let (_, bookkeeping) = publisher
            .publish(
                &Deadline::none(),
                &request("ocm.software/git-controller", GIT_CONTROLLER),
                bookkeeping,
                "git-controller",
            )
            .unwrap();

        let first = provider
            .file("main", "clusters/dev/ocm-system/ocm-controller.yaml")
            .unwrap();
        let second = provider
            .file("main", "clusters/dev/ocm-system/git-controller.yaml")
            .unwrap();
        assert!(first.contains("kind: Namespace"));
        assert!(!second.contains("kind: Namespace"));
        assert!(second.contains("name: git-controller"));
        assert_eq!(
            bookkeeping.components("ocm-system"),
            ["ocm-controller", "git-controller"]
        );
    }

    #[test]
    fn test_gitea_content_is_encoded() {
        let (provider, repository) = setup(ProviderKind::Gitea);
        let publisher = Publisher::new(&provider, &repository);
        publisher
            .publish(
                &Deadline::none(),
                &request("ocm.software/ocm-controller", OCM_CONTROLLER),
                NamespaceBookkeeping::default(),
                "ocm-controller",
            )
            .unwrap();
        let raw = provider
            .raw_file("main", "clusters/dev/ocm-system/ocm-controller.yaml")
            .unwrap();
        assert_ne!(raw, OCM_CONTROLLER);
        assert_eq!(ProviderKind::Gitea.decode_content(&raw), OCM_CONTROLLER.as_bytes());
    }

    #[test]
    fn test_bookkeeping_namespaces_sorted() {
        let bookkeeping = NamespaceBookkeeping::default()
            .record("ocm-system", "ocm-controller")
            .record("mpas-system", "mpas-project-controller");
        assert_eq!(bookkeeping.namespaces().collect::<Vec<_>>(), ["mpas-system", "ocm-system"]);
        assert!(!bookkeeping.has_components("flux-system"));
    }
}
