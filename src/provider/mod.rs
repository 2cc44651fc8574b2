//! Git hosting providers
//!
//! This module handles:
//! - Selecting a backend by name ([`ProviderKind`])
//! - Looking up or creating the management repository
//! - Creating multi-file commits on a branch
//! - Deleting the repository on explicit teardown
//!
//! Every backend talks to its hosting API over REST; no local clone is
//! needed to publish manifests.

pub mod gitea;
pub mod github;
pub mod gitlab;
mod http;

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::deadline::Deadline;
use crate::error::{Result, config};

/// Supported hosting backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    GitHub,
    Gitea,
    GitLab,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [ProviderKind::GitHub, ProviderKind::Gitea, ProviderKind::GitLab];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::Gitea => "gitea",
            ProviderKind::GitLab => "gitlab",
        }
    }

    /// Environment variable the token is read from when not given explicitly.
    pub fn token_env_var(self) -> &'static str {
        match self {
            ProviderKind::GitHub => "GITHUB_TOKEN",
            ProviderKind::Gitea => "GITEA_TOKEN",
            ProviderKind::GitLab => "GITLAB_TOKEN",
        }
    }

    /// Encodes file content the way the backend's commit API expects it.
    ///
    /// Gitea takes base64; the others take the raw text.
    pub fn encode_content(self, data: &[u8]) -> String {
        match self {
            ProviderKind::Gitea => STANDARD.encode(data),
            ProviderKind::GitHub | ProviderKind::GitLab => String::from_utf8_lossy(data).into_owned(),
        }
    }

    /// Inverse of [`encode_content`](Self::encode_content).
    pub fn decode_content(self, content: &str) -> Vec<u8> {
        match self {
            ProviderKind::Gitea => {
                decode_base64(content).unwrap_or_else(|| content.as_bytes().to_vec())
            }
            ProviderKind::GitHub | ProviderKind::GitLab => content.as_bytes().to_vec(),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = crate::error::GroundworkError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| config::unsupported_provider(s))
    }
}

/// Connection settings for a backend.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub kind: ProviderKind,
    /// API host; the public service when unset (required for Gitea).
    pub hostname: Option<String>,
    pub token: String,
    /// Talk to a self-hosted API over plain http.
    pub plain_http: bool,
    /// Repository deletion is refused unless this is set.
    pub destructive_actions: bool,
}

impl ProviderOptions {
    /// URL scheme for self-hosted APIs.
    pub fn scheme(&self) -> &'static str {
        if self.plain_http { "http" } else { "https" }
    }
}

/// Desired shape of the management repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySpec {
    pub owner: String,
    /// Repository name, optionally prefixed with sub-organizations (`team/infra/repo`).
    pub name: String,
    pub personal: bool,
    pub description: String,
    pub default_branch: String,
    pub visibility: String,
}

impl RepositorySpec {
    /// Splits `name` into its sub-organizations and the bare repository name.
    pub fn split_name(&self) -> (Vec<String>, String) {
        split_sub_organizations(&self.name)
    }

    pub fn is_private(&self) -> bool {
        self.visibility != "public"
    }
}

/// `a/b/repo` becomes `(["a", "b"], "repo")`.
pub fn split_sub_organizations(name: &str) -> (Vec<String>, String) {
    let mut parts: Vec<String> = name
        .split('/')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    let repo = parts.pop().unwrap_or_default();
    (parts, repo)
}

/// A repository that exists on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementRepository {
    pub provider: ProviderKind,
    /// Backend identifier used in API paths (`owner/name`, or a project id).
    pub id: String,
    /// Human-readable `owner/.../name`.
    pub full_path: String,
    pub clone_url: String,
    pub default_branch: String,
}

/// A file in a commit; `content` is already encoded for the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFile {
    pub path: String,
    pub content: String,
}

/// Result of a commit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Created { sha: String },
    /// Every file already had the requested content at `head`.
    Unchanged { head: String },
}

impl CommitOutcome {
    pub fn sha(&self) -> &str {
        match self {
            CommitOutcome::Created { sha } => sha,
            CommitOutcome::Unchanged { head } => head,
        }
    }
}

/// Capability set every hosting backend provides.
pub trait GitProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn find_repository(
        &self,
        deadline: &Deadline,
        spec: &RepositorySpec,
    ) -> Result<Option<ManagementRepository>>;

    fn create_repository(
        &self,
        deadline: &Deadline,
        spec: &RepositorySpec,
    ) -> Result<ManagementRepository>;

    /// Current commit of `branch`.
    fn branch_head(&self, deadline: &Deadline, repo: &ManagementRepository, branch: &str)
    -> Result<String>;

    fn create_commit(
        &self,
        deadline: &Deadline,
        repo: &ManagementRepository,
        branch: &str,
        message: &str,
        files: &[CommitFile],
    ) -> Result<CommitOutcome>;

    fn delete_repository(&self, deadline: &Deadline, repo: &ManagementRepository) -> Result<()>;

    /// Returns the repository, creating it when it does not exist yet.
    fn reconcile_repository(
        &self,
        deadline: &Deadline,
        spec: &RepositorySpec,
    ) -> Result<ManagementRepository> {
        match self.find_repository(deadline, spec)? {
            Some(repo) => {
                tracing::debug!(repository = %repo.full_path, "using existing repository");
                Ok(repo)
            }
            None => {
                let repo = self.create_repository(deadline, spec)?;
                tracing::info!(repository = %repo.full_path, "created repository");
                Ok(repo)
            }
        }
    }
}

/// Builds the backend for `options.kind`.
pub fn build(options: ProviderOptions) -> Result<Box<dyn GitProvider>> {
    Ok(match options.kind {
        ProviderKind::GitHub => Box::new(github::GitHubProvider::new(options)?),
        ProviderKind::Gitea => Box::new(gitea::GiteaProvider::new(options)?),
        ProviderKind::GitLab => Box::new(gitlab::GitLabProvider::new(options)?),
    })
}

/// Decodes API base64 content, which may be wrapped across lines.
pub(crate) fn decode_base64(content: &str) -> Option<Vec<u8>> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).ok()
}

fn refuse_without_destructive(options: &ProviderOptions, repo: &ManagementRepository) -> Result<()> {
    if options.destructive_actions {
        return Ok(());
    }
    Err(config::invalid(format!(
        "refusing to delete {}: destructive actions are disabled",
        repo.full_path
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("github".parse::<ProviderKind>().unwrap(), ProviderKind::GitHub);
        assert_eq!("Gitea".parse::<ProviderKind>().unwrap(), ProviderKind::Gitea);
        assert_eq!("gitlab".parse::<ProviderKind>().unwrap(), ProviderKind::GitLab);
    }

    #[test]
    fn test_unsupported_provider() {
        let err = "bitbucket".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(
            err,
            crate::error::GroundworkError::UnsupportedProvider { ref name } if name == "bitbucket"
        ));
    }

    #[test]
    fn test_gitea_content_is_base64() {
        let encoded = ProviderKind::Gitea.encode_content(b"kind: Namespace\n");
        assert_eq!(encoded, "a2luZDogTmFtZXNwYWNlCg==");
        assert_eq!(ProviderKind::Gitea.decode_content(&encoded), b"kind: Namespace\n");
    }

    #[test]
    fn test_github_content_is_raw() {
        assert_eq!(ProviderKind::GitHub.encode_content(b"a: b"), "a: b");
        assert_eq!(ProviderKind::GitLab.decode_content("a: b"), b"a: b");
    }

    #[test]
    fn test_decode_base64_with_line_breaks() {
        assert_eq!(decode_base64("a2luZDog\nTmFtZXNwYWNlCg==\n").unwrap(), b"kind: Namespace\n");
    }

    #[test]
    fn test_split_sub_organizations() {
        assert_eq!(
            split_sub_organizations("platform/infra/management"),
            (vec!["platform".to_string(), "infra".to_string()], "management".to_string())
        );
        assert_eq!(split_sub_organizations("management"), (vec![], "management".to_string()));
    }

    #[test]
    fn test_commit_outcome_sha() {
        let created = CommitOutcome::Created { sha: "abc".into() };
        let unchanged = CommitOutcome::Unchanged { head: "def".into() };
        assert_eq!(created.sha(), "abc");
        assert_eq!(unchanged.sha(), "def");
    }

    #[test]
    fn test_delete_refused_without_destructive_actions() {
        let options = ProviderOptions {
            kind: ProviderKind::GitHub,
            hostname: None,
            token: "t".into(),
            plain_http: false,
            destructive_actions: false,
        };
        let repo = ManagementRepository {
            provider: ProviderKind::GitHub,
            id: "acme/mgmt".into(),
            full_path: "acme/mgmt".into(),
            clone_url: "https://github.com/acme/mgmt.git".into(),
            default_branch: "main".into(),
        };
        assert!(refuse_without_destructive(&options, &repo).is_err());
    }
}
