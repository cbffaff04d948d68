//! batch::workflows
//!
//! Per-repository workflows the batch commands run.
//!
//! Each workflow takes a freshly built [`RepositoryHandle`] and returns a
//! serializable summary for the batch report. Errors propagate so the
//! batch can record them; merge conflicts do not, they are part of the
//! summary.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::git::{CommitSummary, Credentials, Identity, ProgressSink};
use crate::sync::{HeadPosition, MergeOutcome, RepositoryHandle, SyncError};

use super::WorkItem;

/// Remote name mirrored branches and tags are pushed to.
pub const MIRROR_REMOTE: &str = "mirror";

/// Settings shared by every handle in a run.
#[derive(Clone)]
pub struct HandleSettings {
    /// Working root; copies live at `{root}/{org}/{repo}`
    pub root: PathBuf,
    /// Transport credentials
    pub credentials: Credentials,
    /// Merge commit identity fallback
    pub identity: Identity,
    /// Release snapshot depth
    pub shallow_depth: Option<u32>,
    /// Progress sink for transfers
    pub progress: Arc<dyn ProgressSink>,
}

impl HandleSettings {
    /// Build the handle for one work item.
    pub fn handle_for(&self, item: &WorkItem) -> RepositoryHandle {
        RepositoryHandle::new(item.id.clone(), self.root.join(&item.id.org), &item.url)
            .with_credentials(self.credentials.clone())
            .with_identity(self.identity.clone())
            .with_shallow_depth(self.shallow_depth)
            .with_progress(Arc::clone(&self.progress))
    }
}

/// Summary of [`backup`].
#[derive(Debug, Clone, Serialize)]
pub struct BackupResult {
    /// Branches `origin` has
    pub branches: Vec<String>,
    /// Checked out default branch, if `origin` has one
    pub head: Option<HeadPosition>,
}

/// Bring the working copy up to date with `url` and check out its
/// default branch.
pub fn backup(handle: &mut RepositoryHandle, url: &str) -> Result<BackupResult, SyncError> {
    handle.open_or_init()?;
    handle.add_remote(url, "origin")?;
    handle.fetch("origin")?;

    let branches = handle.get_branches("origin")?;
    let head = if branches.is_empty() {
        tracing::info!("{}: origin has no branches", handle.id());
        None
    } else {
        handle.checkout_active_branch()?
    };

    Ok(BackupResult { branches, head })
}

/// Summary of [`mirror`].
#[derive(Debug, Clone, Serialize)]
pub struct MirrorResult {
    /// Branches pushed to the mirror
    pub branches: Vec<String>,
    /// Number of tags pushed to the mirror
    pub tags: usize,
}

/// Replicate every branch and tag of `url` onto `mirror_url`.
///
/// Branches are force-pushed from their `origin` remote-tracking refs, so
/// the mirror ends up identical to what `origin` had when fetched.
pub fn mirror(
    handle: &mut RepositoryHandle,
    url: &str,
    mirror_url: &str,
) -> Result<MirrorResult, SyncError> {
    handle.open_or_init()?;
    handle.add_remote(url, "origin")?;
    handle.fetch("origin")?;
    handle.add_remote(mirror_url, MIRROR_REMOTE)?;

    let branches = handle.get_branches("origin")?;
    for branch in &branches {
        handle.push_branch("origin", MIRROR_REMOTE, branch)?;
    }
    let tags = handle.get_tags("origin")?.len();
    handle.push_all_tags(MIRROR_REMOTE)?;

    Ok(MirrorResult { branches, tags })
}

/// What [`migrate`] should do after building the branch.
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Commit or bare version the branch starts from
    pub base: String,
    /// Branch to build
    pub branch: String,
    /// Branch to merge in afterwards
    pub merge: Option<String>,
    /// Remote to push all branches to afterwards
    pub push: Option<String>,
}

/// Summary of [`migrate`].
#[derive(Debug, Clone, Serialize)]
pub struct MigrateResult {
    /// Where HEAD ended up
    pub head: HeadPosition,
    /// Outcome of the optional merge
    pub merge: Option<MergeOutcome>,
    /// Remote branches were pushed to
    pub pushed_to: Option<String>,
}

/// Build a migration branch from a base, optionally merge into it and
/// optionally push.
///
/// A merge that does not come out clean leaves the branch unpushed; the
/// conflict is reported in the summary and the batch goes on.
pub fn migrate(
    handle: &mut RepositoryHandle,
    url: &str,
    options: &MigrateOptions,
) -> Result<MigrateResult, SyncError> {
    handle.open_or_init()?;
    handle.add_remote(url, "origin")?;
    handle.fetch("origin")?;

    let mut head = handle.checkout_new_branch(&options.base, &options.branch)?;

    let merge = options
        .merge
        .as_deref()
        .map(|branch| handle.merge_without_commit(branch));

    let pushed_to = match (&options.push, &merge) {
        (Some(remote), Some(outcome)) if !outcome.is_clean() => {
            tracing::warn!("{}: not pushing to {remote} after failed merge", handle.id());
            None
        }
        (Some(remote), _) => {
            handle.push_all_branches(remote)?;
            Some(remote.clone())
        }
        (None, _) => None,
    };

    if merge.as_ref().is_some_and(MergeOutcome::is_clean) {
        head = handle.head_position()?;
    }

    Ok(MigrateResult {
        head,
        merge,
        pushed_to,
    })
}

/// Replace the working copy with a snapshot of `tag`.
pub fn release(handle: &mut RepositoryHandle, tag: &str) -> Result<HeadPosition, SyncError> {
    handle.clone_tag(tag)?;
    handle.head_position()
}

/// Latest merge commit on `refname` before `before`, from the local copy.
pub fn find_merge(
    handle: &mut RepositoryHandle,
    refname: &str,
    before: DateTime<Utc>,
) -> Result<Option<CommitSummary>, SyncError> {
    let found = handle.find_latest_merge_before(refname, before)?;
    match &found {
        Some(commit) => tracing::info!(
            "{}: latest merge on {refname} before {before} is {} ({})",
            handle.id(),
            commit.oid.short(7),
            commit.committed_at
        ),
        None => tracing::info!("{}: no merge on {refname} before {before}", handle.id()),
    }
    Ok(found)
}
