//! Common test utilities for groundwork integration tests

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

/// A scratch directory the binary runs in, so no `groundwork.yaml` from the
/// developer's checkout is picked up.
pub struct TestDir {
    pub temp: TempDir,
}

impl TestDir {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Write a file in the directory and return its path
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp.path().join(name);
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// The groundwork binary, run inside this directory with a clean environment
    #[allow(deprecated)]
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("groundwork").expect("groundwork binary");
        cmd.current_dir(self.temp.path())
            .env_remove("GROUNDWORK_CONFIG")
            .env_remove("GITHUB_TOKEN")
            .env_remove("GITEA_TOKEN")
            .env_remove("GITLAB_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
