//! Committing and pushing files in a working copy

use std::path::Path;

use git2::{Oid, PushOptions, RemoteCallbacks, Repository, Signature};

use super::auth::setup_auth_callbacks;
use super::error::interpret_git_error;
use crate::error::{Result, fs, transport};

pub const AUTHOR_NAME: &str = "groundwork";
pub const AUTHOR_EMAIL: &str = "groundwork@users.noreply.local";

/// Writes `files` into the working copy and commits them on HEAD.
///
/// Returns `None` when the resulting tree equals HEAD's, in which case no
/// commit is made.
pub fn write_and_commit(
    repo: &Repository,
    files: &[(String, Vec<u8>)],
    message: &str,
) -> Result<Option<Oid>> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| transport::git_operation_failed("repository has no working directory"))?;

    let mut index = repo.index()?;
    for (path, content) in files {
        let full = workdir.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| fs::write_failed(parent, e))?;
        }
        std::fs::write(&full, content).map_err(|e| fs::write_failed(&full, e))?;
        index.add_path(Path::new(path))?;
    }
    index.write()?;

    let tree_id = index.write_tree()?;
    let head = repo.head()?.peel_to_commit()?;
    if head.tree_id() == tree_id {
        return Ok(None);
    }

    let signature = Signature::now(AUTHOR_NAME, AUTHOR_EMAIL)?;
    let tree = repo.find_tree(tree_id)?;
    let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &[&head])?;
    Ok(Some(oid))
}

pub fn head_sha(repo: &Repository) -> Result<String> {
    Ok(repo.head()?.peel_to_commit()?.id().to_string())
}

/// Pushes `branch` to `origin`; a rejected ref update is an error.
pub fn push(repo: &Repository, branch: &str, token: &str) -> Result<()> {
    let mut remote = repo.find_remote("origin")?;

    let mut callbacks = RemoteCallbacks::new();
    setup_auth_callbacks(&mut callbacks, token);
    callbacks.push_update_reference(|refname, status| match status {
        Some(reason) => Err(git2::Error::from_str(&format!("{refname} rejected: {reason}"))),
        None => Ok(()),
    });

    let mut options = PushOptions::new();
    options.remote_callbacks(callbacks);
    let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
    remote
        .push(&[refspec.as_str()], Some(&mut options))
        .map_err(|e| transport::git_operation_failed(format!("push {branch}: {}", interpret_git_error(&e))))
}
