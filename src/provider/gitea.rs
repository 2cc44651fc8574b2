//! Gitea backend
//!
//! Uses the change-files API, which takes base64 content and creates a
//! single commit for any number of files.

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

pub struct GiteaProvider {
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
struct Branch {
    commit: BranchCommit,
}

#[derive(Deserialize)]
struct BranchCommit {
    id: String,
}

#[derive(Deserialize)]
struct Contents {
    sha: String,
    content: Option<String>,
}

#[derive(Deserialize)]
struct FilesResponse {
    commit: CommitRef,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: String,
}

impl GiteaProvider {
    pub fn new(options: ProviderOptions) -> Result<Self> {
        let host = options
            .hostname
            .clone()
            .ok_or_else(|| config::invalid("a hostname is required for gitea"))?;
        let base = format!("{}://{host}/api/v1", options.scheme());
        Self::with_api_base(options, base)
    }

    pub(crate) fn with_api_base(options: ProviderOptions, base: String) -> Result<Self> {
        let api = ApiClient::new(
            ProviderKind::Gitea,
            base,
            (AUTHORIZATION, format!("token {}", options.token)),
        )?;
        Ok(Self { options, api })
    }

    fn to_repository(repo: Repo, branch: &str) -> ManagementRepository {
        ManagementRepository {
            provider: ProviderKind::Gitea,
            id: repo.full_name.clone(),
            full_path: repo.full_name,
            clone_url: repo.clone_url,
            default_branch: repo.default_branch.unwrap_or_else(|| branch.to_string()),
        }
    }
}

impl GitProvider for GiteaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gitea
    }

    fn find_repository(
        &self,
        deadline: &Deadline,
        spec: &RepositorySpec,
    ) -> Result<Option<ManagementRepository>> {
        let (sub_orgs, name) = spec.split_name();
        if !sub_orgs.is_empty() {
            return Err(config::invalid("Gitea does not support sub-organizations"));
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
        let created: Repo = self.api.send(
            deadline,
            Method::POST,
            &path,
            &json!({
                "name": name,
                "description": spec.description,
                "private": spec.is_private(),
                "auto_init": true,
                "default_branch": spec.default_branch,
            }),
        )?;
        Ok(Self::to_repository(created, &spec.default_branch))
    }

    fn branch_head(
        &self,
        deadline: &Deadline,
        repo: &ManagementRepository,
        branch: &str,
    ) -> Result<String> {
        self.api
            .get::<Branch>(
                deadline,
                &format!("/repos/{}/branches/{}", repo.id, encode_segment(branch)),
            )?
            .map(|b| b.commit.id)
            .ok_or_else(|| {
                transport::provider_request("gitea", 404, format!("branch {branch} not found"))
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
        let mut changes = Vec::new();
        for file in files {
            let existing: Option<Contents> = self.api.get(
                deadline,
                &format!(
                    "/repos/{}/contents/{}?ref={}",
                    repo.id,
                    file.path,
                    encode_segment(branch)
                ),
            )?;
            let wanted = ProviderKind::Gitea.decode_content(&file.content);
            match existing {
                Some(current)
                    if current.content.as_deref().and_then(decode_base64).as_deref()
                        == Some(wanted.as_slice()) => {}
                Some(current) => changes.push(json!({
                    "operation": "update",
                    "path": file.path,
                    "content": file.content,
                    "sha": current.sha,
                })),
                None => changes.push(json!({
                    "operation": "create",
                    "path": file.path,
                    "content": file.content,
                })),
            }
        }

        if changes.is_empty() {
            let head = self.branch_head(deadline, repo, branch)?;
            return Ok(CommitOutcome::Unchanged { head });
        }

        let response: FilesResponse = self.api.send(
            deadline,
            Method::POST,
            &format!("/repos/{}/contents", repo.id),
            &json!({ "branch": branch, "message": message, "files": changes }),
        )?;
        Ok(CommitOutcome::Created {
            sha: response.commit.sha,
        })
    }

    fn delete_repository(&self, deadline: &Deadline, repo: &ManagementRepository) -> Result<()> {
        refuse_without_destructive(&self.options, repo)?;
        self.api.delete(deadline, &format!("/repos/{}", repo.id))
    }
}
