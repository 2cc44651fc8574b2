//! GitHub backend
//!
//! Multi-file commits go through the git data API: a tree is built on top
//! of the branch head, a commit is created for it and the branch ref is
//! fast-forwarded.

use reqwest::Method;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;

use crate::deadline::Deadline;
use crate::error::{Result, config, transport};

use super::http::{ApiClient, encode_segment};
use super::{
    CommitFile, CommitOutcome, GitProvider, ManagementRepository, ProviderKind, ProviderOptions,
    RepositorySpec, decode_base64, refuse_without_destructive,
};

pub struct GitHubProvider {
    options: ProviderOptions,
    api: ApiClient,
}

#[derive(Deserialize)]
struct Repo {
    full_name: String,
    clone_url: String,
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct Ref {
    object: RefObject,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct Commit {
    sha: String,
    tree: Tree,
}

#[derive(Deserialize)]
struct Tree {
    sha: String,
}

#[derive(Deserialize)]
struct Contents {
    content: Option<String>,
}

/// `https://api.github.com` for github.com, `/api/v3` on enterprise hosts.
fn api_base(options: &ProviderOptions) -> String {
    match options.hostname.as_deref() {
        None | Some("github.com") => "https://api.github.com".to_string(),
        Some(host) => format!("{}://{host}/api/v3", options.scheme()),
    }
}

impl GitHubProvider {
    pub fn new(options: ProviderOptions) -> Result<Self> {
        let base = api_base(&options);
        Self::with_api_base(options, base)
    }

    pub(crate) fn with_api_base(options: ProviderOptions, base: String) -> Result<Self> {
        let api = ApiClient::new(
            ProviderKind::GitHub,
            base,
            (AUTHORIZATION, format!("Bearer {}", options.token)),
        )?;
        Ok(Self { options, api })
    }

    fn to_repository(repo: Repo, branch: &str) -> ManagementRepository {
        ManagementRepository {
            provider: ProviderKind::GitHub,
            id: repo.full_name.clone(),
            full_path: repo.full_name,
            clone_url: repo.clone_url,
            default_branch: repo.default_branch.unwrap_or_else(|| branch.to_string()),
        }
    }

    fn ref_path(repo: &ManagementRepository, branch: &str) -> String {
        format!("/repos/{}/git/ref/heads/{}", repo.id, branch)
    }

    /// Creates `branch` from the default branch when it does not exist yet.
    fn ensure_branch(&self, deadline: &Deadline, repo: &ManagementRepository, branch: &str) -> Result<()> {
        if self
            .api
            .get::<Ref>(deadline, &Self::ref_path(repo, branch))?
            .is_some()
        {
            return Ok(());
        }
        let base = self.branch_head(deadline, repo, &repo.default_branch)?;
        let _: serde_json::Value = self.api.send(
            deadline,
            Method::POST,
            &format!("/repos/{}/git/refs", repo.id),
            &json!({ "ref": format!("refs/heads/{branch}"), "sha": base }),
        )?;
        Ok(())
    }

    fn unchanged(
        &self,
        deadline: &Deadline,
        repo: &ManagementRepository,
        branch: &str,
        files: &[CommitFile],
    ) -> Result<bool> {
        for file in files {
            let path = format!(
                "/repos/{}/contents/{}?ref={}",
                repo.id,
                file.path,
                encode_segment(branch)
            );
            let current = self
                .api
                .get::<Contents>(deadline, &path)?
                .and_then(|c| c.content)
                .and_then(|c| decode_base64(&c));
            if current.as_deref() != Some(file.content.as_bytes()) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl GitProvider for GitHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    fn find_repository(
        &self,
        deadline: &Deadline,
        spec: &RepositorySpec,
    ) -> Result<Option<ManagementRepository>> {
        let (sub_orgs, name) = spec.split_name();
        if !sub_orgs.is_empty() {
            return Err(config::invalid("GitHub does not support sub-organizations"));
        }
        let repo = self
            .api
            .get::<Repo>(deadline, &format!("/repos/{}/{}", spec.owner, name))?;
        Ok(repo.map(|r| Self::to_repository(r, &spec.default_branch)))
    }

    fn create_repository(
        &self,
        deadline: &Deadline,
        spec: &RepositorySpec,
    ) -> Result<ManagementRepository> {
        let (_, name) = spec.split_name();
        let path = if spec.personal {
            "/user/repos".to_string()
        } else {
            format!("/orgs/{}/repos", spec.owner)
        };
        let mut body = json!({
            "name": name,
            "description": spec.description,
            "private": spec.is_private(),
            "auto_init": true,
        });
        if !spec.personal {
            body["visibility"] = json!(spec.visibility);
        }
        let created: Repo = self.api.send(deadline, Method::POST, &path, &body)?;
        let repo = Self::to_repository(created, &spec.default_branch);
        self.ensure_branch(deadline, &repo, &spec.default_branch)?;
        Ok(repo)
    }

    fn branch_head(
        &self,
        deadline: &Deadline,
        repo: &ManagementRepository,
        branch: &str,
    ) -> Result<String> {
        self.api
            .get::<Ref>(deadline, &Self::ref_path(repo, branch))?
            .map(|r| r.object.sha)
            .ok_or_else(|| {
                transport::provider_request("github", 404, format!("branch {branch} not found"))
            })
    }

    fn create_commit(
        &self,
        deadline: &Deadline,
        repo: &ManagementRepository,
        branch: &str,
        message: &str,
        files: &[CommitFile],
    ) -> Result<CommitOutcome> {
        let head = self.branch_head(deadline, repo, branch)?;
        if self.unchanged(deadline, repo, branch, files)? {
            return Ok(CommitOutcome::Unchanged { head });
        }

        let parent: Option<Commit> = self
            .api
            .get(deadline, &format!("/repos/{}/git/commits/{}", repo.id, head))?;
        let base_tree = parent
            .map(|c| c.tree.sha)
            .ok_or_else(|| transport::provider_request("github", 404, format!("commit {head} not found")))?;

        let entries: Vec<_> = files
            .iter()
            .map(|f| json!({ "path": f.path, "mode": "100644", "type": "blob", "content": f.content }))
            .collect();
        let tree: Tree = self.api.send(
            deadline,
            Method::POST,
            &format!("/repos/{}/git/trees", repo.id),
            &json!({ "base_tree": base_tree, "tree": entries }),
        )?;
        let commit: Commit = self.api.send(
            deadline,
            Method::POST,
            &format!("/repos/{}/git/commits", repo.id),
            &json!({ "message": message, "tree": tree.sha, "parents": [head] }),
        )?;
        let _: serde_json::Value = self.api.send(
            deadline,
            Method::PATCH,
            &format!("/repos/{}/git/refs/heads/{}", repo.id, branch),
            &json!({ "sha": commit.sha, "force": false }),
        )?;
        Ok(CommitOutcome::Created { sha: commit.sha })
    }

    fn delete_repository(&self, deadline: &Deadline, repo: &ManagementRepository) -> Result<()> {
        refuse_without_destructive(&self.options, repo)?;
        self.api.delete(deadline, &format!("/repos/{}", repo.id))
    }
}
