//! Whole-project install lock.
//!
//! One install at a time per project: the lock is an exclusive advisory
//! lock on `node_modules/.hoist-install.lock`, released when the guard
//! drops.

use super::error::PkgError;
use super::tree::NODE_MODULES;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file name inside `node_modules`.
pub const INSTALL_LOCK_NAME: &str = ".hoist-install.lock";

/// Held install lock.
#[derive(Debug)]
pub struct ProjectLock {
    file: File,
    path: PathBuf,
}

impl ProjectLock {
    /// Take the install lock for `project_root` without blocking.
    ///
    /// # Errors
    /// Returns `PKG_INSTALL_LOCKED` if another install holds the lock, or
    /// `PKG_IO_ERROR` if the lock file cannot be created.
    pub fn acquire(project_root: &Path) -> Result<Self, PkgError> {
        let dir = project_root.join(NODE_MODULES);
        fs::create_dir_all(&dir)
            .map_err(|e| PkgError::io(format!("Failed to create {}: {e}", dir.display())))?;

        let path = dir.join(INSTALL_LOCK_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| PkgError::io(format!("Failed to open {}: {e}", path.display())))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(PkgError::install_locked(&path))
            }
            Err(e) => Err(PkgError::io(format!(
                "Failed to lock {}: {e}",
                path.display()
            ))),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
