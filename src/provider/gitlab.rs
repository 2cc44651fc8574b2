//! GitLab backend
//!
//! Projects are addressed by numeric id once found. Sub-organizations map
//! to nested groups.

use reqwest::Method;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;

use crate::deadline::Deadline;
use crate::error::{Result, transport};

use super::http::{ApiClient, encode_segment};
use super::{
    CommitFile, CommitOutcome, GitProvider, ManagementRepository, ProviderKind, ProviderOptions,
    RepositorySpec, decode_base64, refuse_without_destructive,
};

pub struct GitLabProvider {
    options: ProviderOptions,
    api: ApiClient,
}

#[derive(Deserialize)]
struct Project {
    id: u64,
    path_with_namespace: String,
    http_url_to_repo: String,
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct Group {
    id: u64,
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
struct File {
    content: String,
}

#[derive(Deserialize)]
struct Commit {
    id: String,
}

impl GitLabProvider {
    pub fn new(options: ProviderOptions) -> Result<Self> {
        let base = match options.hostname.as_deref() {
            None | Some("gitlab.com") => "https://gitlab.com/api/v4".to_string(),
            Some(host) => format!("{}://{host}/api/v4", options.scheme()),
        };
        Self::with_api_base(options, base)
    }

    pub(crate) fn with_api_base(options: ProviderOptions, base: String) -> Result<Self> {
        let api = ApiClient::new(
            ProviderKind::GitLab,
            base,
            (AUTHORIZATION, format!("Bearer {}", options.token)),
        )?;
        Ok(Self { options, api })
    }

    fn to_repository(project: Project, branch: &str) -> ManagementRepository {
        ManagementRepository {
            provider: ProviderKind::GitLab,
            id: project.id.to_string(),
            full_path: project.path_with_namespace,
            clone_url: project.http_url_to_repo,
            default_branch: project.default_branch.unwrap_or_else(|| branch.to_string()),
        }
    }

    /// `owner/sub/orgs` for organization projects.
    fn namespace_path(spec: &RepositorySpec) -> String {
        let (sub_orgs, _) = spec.split_name();
        std::iter::once(spec.owner.clone())
            .chain(sub_orgs)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Whether the file already holds `content` on `branch`.
    fn file_matches(
        &self,
        deadline: &Deadline,
        repo: &ManagementRepository,
        branch: &str,
        file: &CommitFile,
    ) -> Result<Option<bool>> {
        let current: Option<File> = self.api.get(
            deadline,
            &format!(
                "/projects/{}/repository/files/{}?ref={}",
                repo.id,
                encode_segment(&file.path),
                encode_segment(branch)
            ),
        )?;
        Ok(current.map(|f| decode_base64(&f.content).as_deref() == Some(file.content.as_bytes())))
    }
}

impl GitProvider for GitLabProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitLab
    }

    fn find_repository(
        &self,
        deadline: &Deadline,
        spec: &RepositorySpec,
    ) -> Result<Option<ManagementRepository>> {
        let (_, name) = spec.split_name();
        let full_path = format!("{}/{}", Self::namespace_path(spec), name);
        let project: Option<Project> = self
            .api
            .get(deadline, &format!("/projects/{}", encode_segment(&full_path)))?;
        Ok(project.map(|p| Self::to_repository(p, &spec.default_branch)))
    }

    fn create_repository(
        &self,
        deadline: &Deadline,
        spec: &RepositorySpec,
    ) -> Result<ManagementRepository> {
        let (_, name) = spec.split_name();
        let mut body = json!({
            "name": name,
            "path": name,
            "description": spec.description,
            "visibility": spec.visibility,
            "initialize_with_readme": true,
            "default_branch": spec.default_branch,
        });
        if !spec.personal {
            let namespace = Self::namespace_path(spec);
            let group: Group = self
                .api
                .get(deadline, &format!("/groups/{}", encode_segment(&namespace)))?
                .ok_or_else(|| {
                    transport::provider_request("gitlab", 404, format!("group {namespace} not found"))
                })?;
            body["namespace_id"] = json!(group.id);
        }
        let created: Project = self.api.send(deadline, Method::POST, "/projects", &body)?;
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
                &format!(
                    "/projects/{}/repository/branches/{}",
                    repo.id,
                    encode_segment(branch)
                ),
            )?
            .map(|b| b.commit.id)
            .ok_or_else(|| {
                transport::provider_request("gitlab", 404, format!("branch {branch} not found"))
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
        let mut actions = Vec::new();
        for file in files {
            let action = match self.file_matches(deadline, repo, branch, file)? {
                Some(true) => continue,
                Some(false) => "update",
                None => "create",
            };
            actions.push(json!({
                "action": action,
                "file_path": file.path,
                "content": file.content,
            }));
        }

        if actions.is_empty() {
            let head = self.branch_head(deadline, repo, branch)?;
            return Ok(CommitOutcome::Unchanged { head });
        }

        let commit: Commit = self.api.send(
            deadline,
            Method::POST,
            &format!("/projects/{}/repository/commits", repo.id),
            &json!({ "branch": branch, "commit_message": message, "actions": actions }),
        )?;
        Ok(CommitOutcome::Created { sha: commit.id })
    }

    fn delete_repository(&self, deadline: &Deadline, repo: &ManagementRepository) -> Result<()> {
        refuse_without_destructive(&self.options, repo)?;
        self.api.delete(deadline, &format!("/projects/{}", repo.id))
    }
}
