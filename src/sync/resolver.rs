//! sync::resolver
//!
//! Resolution of a migration "base" into a branch to work on.
//!
//! A base token is either something the backend resolves to a commit (a
//! hash, abbreviated hash or any ref name) or a bare version such as
//! `1.2.3` that stands for the tag `v1.2.3`. Both lookups are plain
//! `Option`-returning queries, tried in that order.
//!
//! A branch that already exists locally wins over the token: it was built by
//! an earlier run and is simply checked out again.

use crate::core::types::{BranchName, Oid, RepoId};
use crate::git::{GitError, RepoQuery};

use super::error::SyncError;
use super::handle::{HeadPosition, RepositoryHandle};

/// What a base token resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseTarget {
    /// The token itself names a commit.
    Commit(Oid),
    /// The token is a bare version; this is the `v`-prefixed tag.
    Tag(String),
}

impl BaseTarget {
    /// Revision string to check out.
    pub fn revision(&self) -> &str {
        match self {
            BaseTarget::Commit(oid) => oid.as_str(),
            BaseTarget::Tag(tag) => tag,
        }
    }
}

/// How to arrive at the requested branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchPlan {
    /// The branch exists locally; check it out and ignore the base.
    CheckoutExisting,
    /// Create the branch at the resolved base.
    CreateFrom(BaseTarget),
}

/// Resolve `token` as a commit, then as the tag `v{token}`.
pub fn resolve_base<Q>(repo: &Q, token: &str) -> Result<Option<BaseTarget>, GitError>
where
    Q: RepoQuery + ?Sized,
{
    if let Some(oid) = repo.resolve_commit(token)? {
        return Ok(Some(BaseTarget::Commit(oid)));
    }

    let tag = format!("v{token}");
    if repo.tag_exists(&tag)? {
        return Ok(Some(BaseTarget::Tag(tag)));
    }

    Ok(None)
}

/// Decide how to reach `new_branch` from `base_token` without touching
/// the working tree.
///
/// # Errors
///
/// - [`SyncError::BaseNotFound`] if the branch does not exist and nothing
///   resolves the token
pub fn plan<Q>(
    repo: &Q,
    id: &RepoId,
    base_token: &str,
    new_branch: &BranchName,
) -> Result<BranchPlan, SyncError>
where
    Q: RepoQuery + ?Sized,
{
    if repo.branch_exists(new_branch.as_str())? {
        return Ok(BranchPlan::CheckoutExisting);
    }

    match resolve_base(repo, base_token)? {
        Some(target) => Ok(BranchPlan::CreateFrom(target)),
        None => Err(SyncError::base_not_found(base_token, id)),
    }
}

/// Check out `new_branch`, creating it at `base_token` when it does not
/// exist yet.
///
/// On creation the base is checked out first (detached), the branch is
/// created at that commit, and then the branch itself is checked out.
pub fn resolve_and_branch(
    handle: &mut RepositoryHandle,
    base_token: &str,
    new_branch: &str,
) -> Result<HeadPosition, SyncError> {
    let branch = BranchName::new(new_branch)?;
    let id = handle.id().clone();
    let plan = plan(handle.local()?, &id, base_token, &branch)?;

    match plan {
        BranchPlan::CheckoutExisting => {
            tracing::info!("{id}: branch {branch} already exists, checking it out");
        }
        BranchPlan::CreateFrom(target) => {
            handle.checkout(target.revision())?;
            handle.create_branch_at_head(&branch)?;
            tracing::info!(
                "{id}: created branch {branch} from {}",
                target.revision()
            );
        }
    }

    handle.checkout(branch.as_str())
}
