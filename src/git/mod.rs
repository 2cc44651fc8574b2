//! Local git operations on the management repository
//!
//! This module handles:
//! - Cloning the repository into a scratch directory (retried once)
//! - Writing files, committing and pushing them
//!
//! Component manifests go through the hosting API (see [`crate::provider`]);
//! the reconciliation agent's own manifests are committed through a real
//! clone so they can also be applied from the working copy.

pub mod auth;
pub mod clone;
pub mod commit;
pub mod error;

use git2::Repository;

use crate::deadline::Deadline;
use crate::error::{Result, transport};
use crate::provider::CommitOutcome;
use crate::temp::ScratchDir;

/// A working copy of the management repository.
pub trait Checkout: Send {
    /// Writes `files` (repository path, content), commits them on `branch`
    /// and pushes. Content already at HEAD yields `Unchanged`.
    fn commit_and_push(
        &mut self,
        deadline: &Deadline,
        branch: &str,
        message: &str,
        files: &[(String, Vec<u8>)],
    ) -> Result<CommitOutcome>;
}

/// A `git2` clone, created on first use.
pub struct LocalCheckout {
    url: String,
    token: String,
    dir: ScratchDir,
    repo: Option<Repository>,
}

impl LocalCheckout {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            token: token.into(),
            dir: ScratchDir::new("repository")?,
            repo: None,
        })
    }
}

impl Checkout for LocalCheckout {
    fn commit_and_push(
        &mut self,
        deadline: &Deadline,
        branch: &str,
        message: &str,
        files: &[(String, Vec<u8>)],
    ) -> Result<CommitOutcome> {
        if self.repo.is_none() {
            let repo = clone::clone_with_retry(deadline, &self.url, branch, &self.token, self.dir.path())?;
            self.repo = Some(repo);
        }
        let Some(repo) = self.repo.as_ref() else {
            return Err(transport::git_operation_failed("repository is not cloned"));
        };

        deadline.check("commit manifests")?;
        match commit::write_and_commit(repo, files, message)? {
            None => {
                let head = commit::head_sha(repo)?;
                tracing::debug!(branch, sha = %head, "nothing to commit");
                Ok(CommitOutcome::Unchanged { head })
            }
            Some(oid) => {
                commit::push(repo, branch, &self.token)?;
                tracing::info!(branch, sha = %oid, "pushed commit");
                Ok(CommitOutcome::Created {
                    sha: oid.to_string(),
                })
            }
        }
    }
}
