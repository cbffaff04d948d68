//! core::lock
//!
//! Exclusive per-repository lock for batch runs.
//!
//! # Architecture
//!
//! A working copy is owned by exactly one process for the duration of its
//! processing. The lock file sits next to the working copy rather than inside
//! it, so that deleting and re-cloning the working copy (release snapshots)
//! does not drop the lock.
//!
//! # Storage
//!
//! - `{root}/{org}/.{repo}.lock` - Lock file with OS-level exclusive lock
//!
//! # Invariants
//!
//! - Lock is held for the whole per-repository workflow
//! - Lock is automatically released on drop (RAII pattern)
//! - Lock acquisition is non-blocking (fails fast if locked)
//!
//! # Example
//!
//! ```ignore
//! use gitmover::core::lock::RepoLock;
//! use gitmover::core::types::RepoId;
//!
//! let lock = RepoLock::acquire(&root, &RepoId::new("acme", "api"))?;
//! // ... sync the working copy ...
//! drop(lock);
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use crate::core::types::RepoId;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("{0} is locked by another gitmover process")]
    AlreadyLocked(PathBuf),

    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// An exclusive lock on one repository's working copy.
///
/// Released when dropped.
#[derive(Debug)]
pub struct RepoLock {
    /// Path to the lock file.
    path: PathBuf,
    /// The open file handle with the lock held.
    file: Option<File>,
}

impl RepoLock {
    /// Path of the lock file guarding `{root}/{org}/{repo}`.
    pub fn path_for(root: &Path, id: &RepoId) -> PathBuf {
        root.join(&id.org).join(format!(".{}.lock", id.repo))
    }

    /// Acquire the lock for a repository under `root`.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if another process holds the lock
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be acquired
    pub fn acquire(root: &Path, id: &RepoId) -> Result<Self, LockError> {
        Self::acquire_at(&Self::path_for(root, id))
    }

    /// Acquire a lock on an explicit lock file path.
    ///
    /// This uses OS-level file locking via `fs2`, which works across
    /// processes. The call never blocks.
    pub fn acquire_at(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LockError::CreateFailed(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path: path.to_path_buf(),
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(LockError::AlreadyLocked(path.to_path_buf()))
            }
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Check if the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock before the guard goes out of scope.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            file.unlock()
                .map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
