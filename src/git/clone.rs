//! Cloning the management repository
//!
//! A failed clone can leave a half-initialized directory behind, so the
//! clone is retried once after emptying the target directory.

use std::path::Path;
use std::thread;
use std::time::Duration;

use git2::{FetchOptions, RemoteCallbacks, Repository, build::RepoBuilder};

use super::auth::setup_auth_callbacks;
use super::error::interpret_git_error;
use crate::deadline::Deadline;
use crate::error::{Result, fs, transport};

pub const CLONE_RETRIES: u32 = 1;
pub const CLONE_RETRY_WAIT: Duration = Duration::from_secs(2);

/// Clones `branch` of `url` into `target`, retrying once after clearing it.
pub fn clone_with_retry(
    deadline: &Deadline,
    url: &str,
    branch: &str,
    token: &str,
    target: &Path,
) -> Result<Repository> {
    retry(CLONE_RETRIES, CLONE_RETRY_WAIT, |attempt| {
        deadline.check("clone repository")?;
        clean_dir(target)?;
        tracing::debug!(url, branch, attempt, "cloning repository");
        clone(url, branch, token, target)
    })
}

/// Clone a single branch of a repository
pub fn clone(url: &str, branch: &str, token: &str, target: &Path) -> Result<Repository> {
    let mut callbacks = RemoteCallbacks::new();
    setup_auth_callbacks(&mut callbacks, token);

    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options);
    builder.branch(branch);
    builder
        .clone(url, target)
        .map_err(|e| transport::clone_failed(url, interpret_git_error(&e)))
}

/// Removes everything inside `dir`, keeping `dir` itself.
pub fn clean_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let entries = std::fs::read_dir(dir).map_err(|e| fs::read_failed(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| fs::read_failed(dir, e))?.path();
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        removed.map_err(|e| fs::write_failed(&path, e))?;
    }
    Ok(())
}

/// Runs `op` up to `retries + 1` times, sleeping `wait` between attempts.
pub fn retry<T>(retries: u32, wait: Duration, mut op: impl FnMut(u32) -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if attempt < retries => {
                tracing::warn!(attempt, error = %err, "retrying");
                thread::sleep(wait);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
