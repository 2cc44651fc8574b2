//! Scratch directories for component installs
//!
//! Temp dirs are never created under the current working directory (e.g. when
//! TMPDIR=tmp or TMPDIR=./tmp).

use std::env;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::Result;

/// Returns a directory path suitable for creating temporary directories.
/// Never returns a relative path.
pub fn temp_dir_base() -> PathBuf {
    let t = env::temp_dir();
    if t.is_absolute() {
        t
    } else {
        #[cfg(windows)]
        {
            env::var("TEMP")
                .or_else(|_| env::var("TMP"))
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("C:\\Windows\\Temp"))
        }
        #[cfg(not(windows))]
        {
            PathBuf::from("/tmp")
        }
    }
}

/// A working directory owned by a single install.
///
/// The directory and everything written into it is removed when the value is
/// dropped, so handing it to the localizer by value ends its life with the
/// install.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Creates `<tmp>/groundwork-<label>-XXXX`.
    pub fn new(label: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("groundwork-{label}-"))
            .tempdir_in(temp_dir_base())?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
