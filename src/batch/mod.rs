//! batch
//!
//! Runs one workflow over many repositories.
//!
//! The work list is built once from the manifest and never changes; the run
//! folds over it and accumulates a [`BatchReport`]. A repository that fails
//! is logged with its `org/repo` and recorded, and the run moves on. Failed
//! repositories are not retried within a run; running again resumes from
//! whatever each working copy holds on disk.
//!
//! Each repository is processed under its [`RepoLock`], so two runs never
//! drive the same working copy.

pub mod manifest;
pub mod workflows;

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::core::lock::{LockError, RepoLock};
use crate::core::types::RepoId;
use crate::sync::SyncError;

pub use manifest::{Manifest, ManifestError, WorkItem};

/// Why one repository failed.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// A repository that was processed.
#[derive(Debug, Clone, Serialize)]
pub struct Completed<T> {
    /// Repository identity
    pub repository: RepoId,
    /// What the workflow produced
    pub result: T,
}

/// A repository that failed.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    /// Repository identity
    pub repository: RepoId,
    /// Error message
    pub error: String,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    /// Repositories that were processed, in manifest order
    pub succeeded: Vec<Completed<T>>,
    /// Repositories that failed, in manifest order
    pub failed: Vec<Failure>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    /// Whether every repository succeeded.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of repositories attempted.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Run `work` over every item, holding each repository's lock under `root`.
pub fn run<T, F>(root: &Path, items: &[WorkItem], mut work: F) -> BatchReport<T>
where
    F: FnMut(&WorkItem) -> Result<T, SyncError>,
{
    let report = items.iter().fold(BatchReport::default(), |mut report, item| {
        match process(root, item, &mut work) {
            Ok(result) => report.succeeded.push(Completed {
                repository: item.id.clone(),
                result,
            }),
            Err(err) => {
                tracing::error!("{}: failed: {}", item.id, err);
                report.failed.push(Failure {
                    repository: item.id.clone(),
                    error: err.to_string(),
                });
            }
        }
        report
    });

    tracing::info!(
        "processed {} repositories: {} succeeded, {} failed",
        report.total(),
        report.succeeded.len(),
        report.failed.len()
    );
    report
}

fn process<T, F>(root: &Path, item: &WorkItem, work: &mut F) -> Result<T, BatchError>
where
    F: FnMut(&WorkItem) -> Result<T, SyncError>,
{
    let _lock = RepoLock::acquire(root, &item.id)?;
    tracing::debug!("{}: processing", item.id);
    Ok(work(item)?)
}
