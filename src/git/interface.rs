//! git::interface
//!
//! Git interface implementation using git2.
//!
//! This module provides the **single doorway** to all Git operations in
//! gitmover. All repository reads, writes and network transfers flow through
//! [`Git`], which normalizes libgit2 errors into typed failure categories and
//! streams transfer progress into a [`ProgressMultiplexer`].
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: No repository at the given path
//! - [`GitError::RefNotFound`]: Requested ref or revision does not exist
//! - [`GitError::RemoteNotFound`]: Named remote is not configured
//! - [`GitError::Network`]: Transport failure talking to a remote
//! - [`GitError::PushRejected`]: Remote refused a ref update
//!
//! # Example
//!
//! ```ignore
//! use gitmover::git::{Credentials, Git, ProgressMultiplexer};
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("/work/acme/api"))?;
//! let mut progress = ProgressMultiplexer::silent();
//! git.fetch("origin", &[], None, &Credentials::default(), &mut progress)?;
//! println!("HEAD is at {}", git.head_oid()?.short(7));
//! ```

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    AutotagOption, BranchType, Cred, CredentialType, Direction, FetchOptions, PackBuilderStage,
    PushOptions, RemoteCallbacks,
};
use serde::Serialize;
use thiserror::Error;

use super::progress::{ProgressMultiplexer, ProgressPhase};
use crate::core::types::{BranchName, Oid, TypeError};

/// Maximum credential callback invocations per transfer before giving up.
///
/// libgit2 keeps asking for credentials as long as the callback returns
/// one, so a rejected key would otherwise loop forever.
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// No repository at the given path.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Requested ref or revision does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Named remote is not configured.
    #[error("remote not found: {name}")]
    RemoteNotFound {
        /// The remote name
        name: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// Invalid ref name format.
    #[error("invalid ref name: {message}")]
    InvalidRefName {
        /// Description of the problem
        message: String,
    },

    /// Authentication with the remote failed.
    #[error("authentication failed: {message}")]
    Auth {
        /// Backend diagnostic
        message: String,
    },

    /// Transport failure talking to a remote.
    #[error("network error: {message}")]
    Network {
        /// Backend diagnostic
        message: String,
    },

    /// The remote refused a ref update during push.
    #[error("push of {refname} rejected: {reason}")]
    PushRejected {
        /// The destination ref
        refname: String,
        /// Reason reported by the remote
        reason: String,
    },

    /// Checkout would overwrite local changes.
    #[error("checkout conflict: {message}")]
    CheckoutConflict {
        /// Backend diagnostic
        message: String,
    },

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match (err.code(), err.class()) {
            (git2::ErrorCode::NotFound, _) => GitError::RefNotFound {
                refname: context.to_string(),
            },
            (git2::ErrorCode::InvalidSpec, _) => GitError::InvalidRefName {
                message: format!("{}: {}", context, err.message()),
            },
            (git2::ErrorCode::Auth, _) => GitError::Auth {
                message: format!("{}: {}", context, err.message()),
            },
            (git2::ErrorCode::Conflict, _) => GitError::CheckoutConflict {
                message: format!("{}: {}", context, err.message()),
            },
            (git2::ErrorCode::Locked, _) => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            (_, git2::ErrorClass::Net | git2::ErrorClass::Ssh | git2::ErrorClass::Http) => {
                GitError::Network {
                    message: format!("{}: {}", context, err.message()),
                }
            }
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::from_git2(err, "git")
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            TypeError::InvalidRefName(msg) => GitError::InvalidRefName { message: msg },
            TypeError::InvalidBranchName(msg) => GitError::InvalidRefName { message: msg },
        }
    }
}

/// How to authenticate against remotes.
///
/// With no key configured the ssh-agent is asked for an identity, matching
/// what `git` does for `git@host:org/repo.git` URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Private key file to offer instead of the agent.
    pub ssh_key: Option<PathBuf>,
}

/// Author/committer used for merge commits when the repository has no
/// `user.name`/`user.email` configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Committer name
    pub name: String,
    /// Committer email
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "gitmover".to_string(),
            email: "gitmover@localhost".to_string(),
        }
    }
}

/// A commit as seen by history queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    /// The commit OID
    pub oid: Oid,
    /// Committer timestamp
    pub committed_at: DateTime<Utc>,
    /// Number of parents (two or more for a merge commit)
    pub parent_count: usize,
}

impl CommitSummary {
    /// Whether this is a merge commit.
    pub fn is_merge(&self) -> bool {
        self.parent_count >= 2
    }
}

/// Kind of a merge conflict, named like git's `CONFLICT (...)` diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both sides changed the same file.
    Content,
    /// Both sides added the same path.
    AddAdd,
    /// One side modified the file, the other deleted it.
    ModifyDelete,
}

/// One conflicted path left in the index by a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictEntry {
    /// Path relative to the working tree root
    pub path: String,
    /// What kind of conflict this is
    pub kind: ConflictKind,
}

impl std::fmt::Display for ConflictEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ConflictKind::Content => write!(f, "CONFLICT (content): Merge conflict in {}", self.path),
            ConflictKind::AddAdd => write!(f, "CONFLICT (add/add): Merge conflict in {}", self.path),
            ConflictKind::ModifyDelete => write!(
                f,
                "CONFLICT (modify/delete): {} deleted in one branch and modified in the other",
                self.path
            ),
        }
    }
}

/// Result of merging a revision into HEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    /// HEAD already contains the revision.
    UpToDate,
    /// HEAD was moved forward to the revision.
    FastForward(Oid),
    /// A merge commit was created.
    Merged(Oid),
    /// The merge stopped with conflicts; the index and working tree hold
    /// conflict markers and the repository is in merge state.
    Conflicted(Vec<ConflictEntry>),
}

/// Summary of working tree status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeStatus {
    /// Number of staged changes
    pub staged: usize,
    /// Number of unstaged changes to tracked files
    pub unstaged: usize,
    /// Number of untracked files
    pub untracked: usize,
    /// Whether there are unresolved conflicts
    pub has_conflicts: bool,
}

impl WorktreeStatus {
    /// Check if the worktree is clean. Untracked files do not count.
    pub fn is_clean(&self) -> bool {
        self.staged == 0 && self.unstaged == 0 && !self.has_conflicts
    }
}

/// Read-only repository queries used by history search and base resolution.
///
/// Implemented by [`Git`]; tests substitute in-memory histories.
pub trait RepoQuery {
    /// Up to `max_count` merge commits reachable from `refname`, newest first.
    fn merge_commits(&self, refname: &str, max_count: usize)
        -> Result<Vec<CommitSummary>, GitError>;

    /// Resolve a revision token (hash, abbreviated hash, ref) to a commit.
    ///
    /// Returns `Ok(None)` when the token does not name a commit.
    fn resolve_commit(&self, token: &str) -> Result<Option<Oid>, GitError>;

    /// Whether a tag with exactly this name exists.
    fn tag_exists(&self, name: &str) -> Result<bool, GitError>;

    /// Whether a local branch with exactly this name exists.
    fn branch_exists(&self, name: &str) -> Result<bool, GitError>;
}

/// The Git interface.
///
/// This is the **single point of interaction** with Git. No other module
/// imports `git2`.
pub struct Git {
    /// The underlying git2 repository
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening
    // =========================================================================

    /// Open the repository rooted exactly at `path`.
    ///
    /// Unlike discovery, parent directories are never searched: a working
    /// directory nested inside some other checkout is not mistaken for it.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if `path` does not hold a repository
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;

        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }

        Ok(Self { repo })
    }

    /// Initialize a new empty repository at `path`, creating directories as needed.
    pub fn init(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::init(path)
            .map_err(|e| GitError::from_git2(e, &path.display().to_string()))?;
        Ok(Self { repo })
    }

    /// Clone `url` into `path` with full history, checking out the remote's
    /// default branch.
    pub fn clone_from(
        url: &str,
        path: &Path,
        credentials: &Credentials,
        progress: &mut ProgressMultiplexer,
    ) -> Result<Self, GitError> {
        let progress = RefCell::new(progress);
        let attempts = Cell::new(0);

        let mut fetch_options = FetchOptions::new();
        fetch_options
            .remote_callbacks(transfer_callbacks(credentials, &attempts, &progress))
            .download_tags(AutotagOption::All);

        let mut builder = RepoBuilder::new();
        builder
            .fetch_options(fetch_options)
            .with_checkout(checkout_with_progress(&progress));

        let repo = builder
            .clone(url, path)
            .map_err(|e| GitError::from_git2(e, url))?;
        progress.borrow_mut().finish();

        Ok(Self { repo })
    }

    // =========================================================================
    // Working Tree Status
    // =========================================================================

    /// Get working tree status summary.
    pub fn worktree_status(&self, include_untracked: bool) -> Result<WorktreeStatus, GitError> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(include_untracked)
            .include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut opts))?;

        let mut result = WorktreeStatus::default();
        for entry in statuses.iter() {
            let status = entry.status();

            if status.is_conflicted() {
                result.has_conflicts = true;
            }
            if status.is_index_new()
                || status.is_index_modified()
                || status.is_index_deleted()
                || status.is_index_renamed()
                || status.is_index_typechange()
            {
                result.staged += 1;
            }
            if status.is_wt_modified()
                || status.is_wt_deleted()
                || status.is_wt_renamed()
                || status.is_wt_typechange()
            {
                result.unstaged += 1;
            }
            if status.is_wt_new() {
                result.untracked += 1;
            }
        }

        Ok(result)
    }

    /// Whether tracked files have staged or unstaged changes.
    pub fn is_dirty(&self) -> Result<bool, GitError> {
        Ok(!self.worktree_status(false)?.is_clean())
    }

    // =========================================================================
    // HEAD and Ref Resolution
    // =========================================================================

    /// Get HEAD commit OID.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if HEAD is unborn (new repository)
    pub fn head_oid(&self) -> Result<Oid, GitError> {
        let commit = self.head_commit()?;
        Ok(Oid::new(commit.id().to_string())?)
    }

    /// HEAD commit OID, or `None` for an unborn HEAD.
    pub fn try_head_oid(&self) -> Result<Option<Oid>, GitError> {
        match self.head_oid() {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Committer timestamp of HEAD's commit.
    pub fn head_commit_time(&self) -> Result<DateTime<Utc>, GitError> {
        Ok(commit_time(&self.head_commit()?))
    }

    /// Whether HEAD points directly at a commit rather than a branch.
    pub fn is_head_detached(&self) -> Result<bool, GitError> {
        Ok(self.repo.head_detached()?)
    }

    /// Get the current branch name, if on a branch.
    ///
    /// Returns `None` if HEAD is detached or unborn.
    pub fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        };

        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(Some(BranchName::new(name)?));
            }
        }

        Ok(None)
    }

    /// Names of tags whose target commit is `oid`, sorted.
    pub fn tags_pointing_at(&self, oid: &Oid) -> Result<Vec<String>, GitError> {
        let target = git2::Oid::from_str(oid.as_str())
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;

        let mut names: Vec<String> = self
            .tag_refs()?
            .into_iter()
            .filter(|(_, commit)| *commit == target)
            .map(|(name, _)| name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Whether HEAD's commit carries exactly the tag `name`.
    pub fn head_is_tagged(&self, name: &str) -> Result<bool, GitError> {
        match self.try_head_oid()? {
            Some(head) => Ok(self.tags_pointing_at(&head)?.iter().any(|t| t == name)),
            None => Ok(false),
        }
    }

    /// All tag names, sorted.
    pub fn list_tags(&self) -> Result<Vec<String>, GitError> {
        let mut names: Vec<String> = self.tag_refs()?.into_iter().map(|(n, _)| n).collect();
        names.sort();
        Ok(names)
    }

    /// All local branch names, sorted.
    pub fn list_branches(&self) -> Result<Vec<BranchName>, GitError> {
        let mut names = Vec::new();
        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name().ok().flatten() {
                if let Ok(branch_name) = BranchName::new(name) {
                    names.push(branch_name);
                }
            }
        }
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(names)
    }

    /// Short names of the remote-tracking branches of `remote`, sorted.
    ///
    /// The symbolic `refs/remotes/<remote>/HEAD` is not a branch and is skipped.
    pub fn list_remote_branches(&self, remote: &str) -> Result<Vec<String>, GitError> {
        let prefix = format!("refs/remotes/{}/", remote);
        let mut names = Vec::new();
        for reference in self.repo.references_glob(&format!("{}*", prefix))? {
            let reference = reference?;
            if let Some(short) = reference.name().and_then(|n| n.strip_prefix(&prefix)) {
                if short != "HEAD" {
                    names.push(short.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolve a ref to its commit, returning None if it doesn't exist.
    pub fn try_resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.repo.find_reference(refname) {
            Ok(reference) => {
                let commit = reference
                    .peel_to_commit()
                    .map_err(|e| GitError::from_git2(e, refname))?;
                Ok(Some(Oid::new(commit.id().to_string())?))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    // =========================================================================
    // Checkout and Branch Creation
    // =========================================================================

    /// Check out `name` the way `git checkout <name>` does.
    ///
    /// Resolution order:
    /// 1. a local branch `name`;
    /// 2. a remote-tracking branch `<remote>/name` (preferring `origin`), from
    ///    which a local tracking branch is created;
    /// 3. any revision (tag, commit hash) checked out as a detached HEAD.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if nothing resolves `name`
    /// - [`GitError::CheckoutConflict`] if local changes would be overwritten
    pub fn checkout(&self, name: &str, progress: &mut ProgressMultiplexer) -> Result<(), GitError> {
        let local = format!("refs/heads/{}", name);
        if self.repo.find_reference(&local).is_ok() {
            return self.checkout_branch_ref(&local, progress);
        }

        if let Some(tracking) = self.find_tracking_ref(name)? {
            let commit = self
                .repo
                .find_reference(&tracking)
                .and_then(|r| r.peel_to_commit())
                .map_err(|e| GitError::from_git2(e, &tracking))?;
            let mut branch = self
                .repo
                .branch(name, &commit, false)
                .map_err(|e| GitError::from_git2(e, name))?;
            let upstream = tracking.trim_start_matches("refs/remotes/");
            branch
                .set_upstream(Some(upstream))
                .map_err(|e| GitError::from_git2(e, upstream))?;
            return self.checkout_branch_ref(&local, progress);
        }

        let commit = self
            .repo
            .revparse_single(name)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| GitError::from_git2(e, name))?;
        self.checkout_commit_tree(&commit, progress)?;
        self.repo
            .set_head_detached(commit.id())
            .map_err(|e| GitError::from_git2(e, name))?;
        Ok(())
    }

    /// Create a local branch at `target` without checking it out.
    pub fn create_branch(&self, name: &BranchName, target: &Oid) -> Result<(), GitError> {
        let oid = git2::Oid::from_str(target.as_str())
            .map_err(|e| GitError::from_git2(e, target.as_str()))?;
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|e| GitError::from_git2(e, target.as_str()))?;
        self.repo
            .branch(name.as_str(), &commit, false)
            .map_err(|e| GitError::from_git2(e, name.as_str()))?;
        Ok(())
    }

    fn checkout_branch_ref(
        &self,
        refname: &str,
        progress: &mut ProgressMultiplexer,
    ) -> Result<(), GitError> {
        let commit = self
            .repo
            .find_reference(refname)
            .and_then(|r| r.peel_to_commit())
            .map_err(|e| GitError::from_git2(e, refname))?;
        self.checkout_commit_tree(&commit, progress)?;
        self.repo
            .set_head(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;
        Ok(())
    }

    fn checkout_commit_tree(
        &self,
        commit: &git2::Commit<'_>,
        progress: &mut ProgressMultiplexer,
    ) -> Result<(), GitError> {
        let progress = RefCell::new(progress);
        let mut checkout = checkout_with_progress(&progress);
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(|e| GitError::from_git2(e, &commit.id().to_string()))?;
        progress.borrow_mut().finish();
        Ok(())
    }

    /// Find `refs/remotes/<remote>/<name>`, preferring `origin` when several
    /// remotes carry the branch.
    fn find_tracking_ref(&self, name: &str) -> Result<Option<String>, GitError> {
        let mut candidates = Vec::new();
        for remote in self.remote_names()? {
            let refname = format!("refs/remotes/{}/{}", remote, name);
            if self.repo.find_reference(&refname).is_ok() {
                candidates.push((remote, refname));
            }
        }

        if let Some((_, refname)) = candidates.iter().find(|(r, _)| r == "origin") {
            return Ok(Some(refname.clone()));
        }
        Ok(candidates.into_iter().next().map(|(_, refname)| refname))
    }

    // =========================================================================
    // Merge
    // =========================================================================

    /// Merge the revision `name` into HEAD.
    ///
    /// Fast-forwards when possible, otherwise creates a merge commit signed
    /// with the repository's configured identity or `fallback`. On
    /// conflicts the repository is left in merge state with markers in the
    /// working tree, like `git merge`.
    pub fn merge(&self, name: &str, fallback: &Identity) -> Result<MergeResult, GitError> {
        let theirs = self
            .repo
            .revparse_single(name)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| GitError::from_git2(e, name))?;
        let theirs_oid = Oid::new(theirs.id().to_string())?;
        let annotated = self.repo.find_annotated_commit(theirs.id())?;
        let (analysis, _) = self.repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            return Ok(MergeResult::UpToDate);
        }

        if analysis.is_fast_forward() || analysis.is_unborn() {
            self.fast_forward_to(&theirs)?;
            return Ok(MergeResult::FastForward(theirs_oid));
        }

        let mut checkout = CheckoutBuilder::new();
        checkout.safe().allow_conflicts(true).conflict_style_merge(true);
        self.repo
            .merge(&[&annotated], None, Some(&mut checkout))
            .map_err(|e| GitError::from_git2(e, name))?;

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            return Ok(MergeResult::Conflicted(collect_conflicts(&index)?));
        }

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let ours = self.head_commit()?;
        let signature = self.signature(fallback)?;
        let message = format!("Merge {} '{}'", self.describe_merge_source(name), name);
        let merged = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &message,
            &tree,
            &[&ours, &theirs],
        )?;
        self.repo.cleanup_state()?;

        Ok(MergeResult::Merged(Oid::new(merged.to_string())?))
    }

    /// Whether the index holds unresolved conflicts.
    pub fn has_conflicts(&self) -> Result<bool, GitError> {
        Ok(self.repo.index()?.has_conflicts())
    }

    fn fast_forward_to(&self, target: &git2::Commit<'_>) -> Result<(), GitError> {
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(target.as_object(), Some(&mut checkout))
            .map_err(|e| GitError::from_git2(e, &target.id().to_string()))?;

        match self.repo.head() {
            Ok(head) if head.is_branch() => {
                let refname = head.name().unwrap_or("HEAD").to_string();
                self.repo
                    .reference(&refname, target.id(), true, "merge: Fast-forward")?;
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                let refname = self
                    .repo
                    .find_reference("HEAD")?
                    .symbolic_target()
                    .unwrap_or("refs/heads/main")
                    .to_string();
                self.repo
                    .reference(&refname, target.id(), true, "merge: Fast-forward")?;
            }
            _ => self.repo.set_head_detached(target.id())?,
        }
        Ok(())
    }

    fn describe_merge_source(&self, name: &str) -> &'static str {
        if self.repo.find_reference(&format!("refs/heads/{}", name)).is_ok() {
            "branch"
        } else if self.find_tracking_ref(name).ok().flatten().is_some()
            || name.contains('/')
        {
            "remote-tracking branch"
        } else {
            "commit"
        }
    }

    fn signature(&self, fallback: &Identity) -> Result<git2::Signature<'static>, GitError> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Ok(git2::Signature::now(&fallback.name, &fallback.email)?),
        }
    }

    // =========================================================================
    // Remote Operations
    // =========================================================================

    /// Names of all configured remotes.
    pub fn remote_names(&self) -> Result<Vec<String>, GitError> {
        let remotes = self.repo.remotes()?;
        Ok(remotes.iter().flatten().map(String::from).collect())
    }

    /// Get the URL for a remote.
    ///
    /// Returns `None` if the remote doesn't exist.
    pub fn remote_url(&self, name: &str) -> Result<Option<String>, GitError> {
        match self.repo.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(String::from)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, name)),
        }
    }

    /// Create a remote with the default fetch refspec.
    pub fn create_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.repo
            .remote(name, url)
            .map_err(|e| GitError::from_git2(e, name))?;
        Ok(())
    }

    /// Delete a remote and its remote-tracking branches.
    pub fn delete_remote(&self, name: &str) -> Result<(), GitError> {
        self.repo.remote_delete(name).map_err(|e| match e.code() {
            git2::ErrorCode::NotFound => GitError::RemoteNotFound {
                name: name.to_string(),
            },
            _ => GitError::from_git2(e, name),
        })
    }

    /// Fetch from `remote`.
    ///
    /// With no `refspecs` the remote's configured refspecs are used and all
    /// tags are downloaded; explicit refspecs only follow tags pointing into
    /// what they fetch. `depth` limits history (shallow fetch).
    pub fn fetch(
        &self,
        remote: &str,
        refspecs: &[String],
        depth: Option<u32>,
        credentials: &Credentials,
        progress: &mut ProgressMultiplexer,
    ) -> Result<(), GitError> {
        let mut handle = self.find_remote(remote)?;
        let progress = RefCell::new(progress);
        let attempts = Cell::new(0);

        let autotag = if refspecs.is_empty() {
            AutotagOption::All
        } else {
            AutotagOption::Auto
        };
        let mut options = FetchOptions::new();
        options
            .remote_callbacks(transfer_callbacks(credentials, &attempts, &progress))
            .download_tags(autotag);
        if let Some(depth) = depth {
            if supports_shallow(handle.url().unwrap_or_default()) {
                options.depth(i32::try_from(depth).unwrap_or(i32::MAX));
            } else {
                tracing::debug!("{}: local transport, fetching full history", remote);
            }
        }

        handle
            .fetch(refspecs, Some(&mut options), None)
            .map_err(|e| GitError::from_git2(e, remote))?;
        progress.borrow_mut().finish();
        Ok(())
    }

    /// Push `refspecs` to `remote`.
    ///
    /// A refspec prefixed with `+` forces the update. Any ref the remote
    /// refuses fails the whole call with [`GitError::PushRejected`].
    pub fn push(
        &self,
        remote: &str,
        refspecs: &[String],
        credentials: &Credentials,
        progress: &mut ProgressMultiplexer,
    ) -> Result<(), GitError> {
        if refspecs.is_empty() {
            return Ok(());
        }

        let mut handle = self.find_remote(remote)?;
        let progress = RefCell::new(progress);
        let attempts = Cell::new(0);
        let rejected: RefCell<Vec<(String, String)>> = RefCell::new(Vec::new());

        let mut callbacks = transfer_callbacks(credentials, &attempts, &progress);
        callbacks.pack_progress(|stage, current, total| {
            let phase = match stage {
                PackBuilderStage::AddingObjects => ProgressPhase::Counting,
                PackBuilderStage::Deltafication => ProgressPhase::Compressing,
            };
            progress
                .borrow_mut()
                .update(phase, current as u64, total as u64, "");
        });
        callbacks.push_transfer_progress(|current, total, _bytes| {
            progress
                .borrow_mut()
                .update(ProgressPhase::Writing, current as u64, total as u64, "");
        });
        callbacks.push_update_reference(|refname, status| {
            if let Some(reason) = status {
                rejected
                    .borrow_mut()
                    .push((refname.to_string(), reason.to_string()));
            }
            Ok(())
        });

        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);
        handle
            .push(refspecs, Some(&mut options))
            .map_err(|e| GitError::from_git2(e, remote))?;
        progress.borrow_mut().finish();

        let first_rejection = rejected.borrow().first().cloned();
        match first_rejection {
            Some((refname, reason)) => Err(GitError::PushRejected { refname, reason }),
            None => Ok(()),
        }
    }

    /// Ask `remote` which branch its HEAD points at.
    ///
    /// Returns `None` when the remote does not advertise a symbolic HEAD
    /// (e.g. an empty repository) or it is not a branch.
    pub fn remote_default_branch(
        &self,
        remote: &str,
        credentials: &Credentials,
    ) -> Result<Option<String>, GitError> {
        let mut handle = self.find_remote(remote)?;
        let attempts = Cell::new(0);
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(credential_callback(credentials, &attempts));

        let connection = handle
            .connect_auth(Direction::Fetch, Some(callbacks), None)
            .map_err(|e| GitError::from_git2(e, remote))?;
        let advertised = match connection.default_branch() {
            Ok(buf) => buf.as_str().map(String::from),
            Err(_) => None,
        };

        Ok(advertised.and_then(|head| head.strip_prefix("refs/heads/").map(String::from)))
    }

    fn find_remote(&self, name: &str) -> Result<git2::Remote<'_>, GitError> {
        self.repo.find_remote(name).map_err(|e| match e.code() {
            git2::ErrorCode::NotFound | git2::ErrorCode::InvalidSpec => GitError::RemoteNotFound {
                name: name.to_string(),
            },
            _ => GitError::from_git2(e, name),
        })
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn head_commit(&self) -> Result<git2::Commit<'_>, GitError> {
        self.repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| match e.code() {
                git2::ErrorCode::UnbornBranch | git2::ErrorCode::NotFound => {
                    GitError::RefNotFound {
                        refname: "HEAD".to_string(),
                    }
                }
                _ => GitError::from_git2(e, "HEAD"),
            })
    }

    /// `(tag name, peeled commit)` for every tag that points at a commit.
    fn tag_refs(&self) -> Result<Vec<(String, git2::Oid)>, GitError> {
        let mut tags = Vec::new();
        for reference in self.repo.references_glob("refs/tags/*")? {
            let reference = reference?;
            let Some(name) = reference.name().and_then(|n| n.strip_prefix("refs/tags/")) else {
                continue;
            };
            if let Ok(commit) = reference.peel_to_commit() {
                tags.push((name.to_string(), commit.id()));
            }
        }
        Ok(tags)
    }
}

impl RepoQuery for Git {
    fn merge_commits(
        &self,
        refname: &str,
        max_count: usize,
    ) -> Result<Vec<CommitSummary>, GitError> {
        let start = self
            .repo
            .revparse_single(refname)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| GitError::from_git2(e, refname))?;

        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;
        walk.push(start.id())?;

        let mut merges = Vec::new();
        for oid in walk {
            if merges.len() >= max_count {
                break;
            }
            let commit = self.repo.find_commit(oid?)?;
            if commit.parent_count() >= 2 {
                merges.push(CommitSummary {
                    oid: Oid::new(commit.id().to_string())?,
                    committed_at: commit_time(&commit),
                    parent_count: commit.parent_count(),
                });
            }
        }
        Ok(merges)
    }

    fn resolve_commit(&self, token: &str) -> Result<Option<Oid>, GitError> {
        match self
            .repo
            .revparse_single(token)
            .and_then(|obj| obj.peel_to_commit())
        {
            Ok(commit) => Ok(Some(Oid::new(commit.id().to_string())?)),
            Err(e)
                if matches!(
                    e.code(),
                    git2::ErrorCode::NotFound
                        | git2::ErrorCode::InvalidSpec
                        | git2::ErrorCode::Ambiguous
                        | git2::ErrorCode::Peel
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(GitError::from_git2(e, token)),
        }
    }

    fn tag_exists(&self, name: &str) -> Result<bool, GitError> {
        Ok(self
            .repo
            .find_reference(&format!("refs/tags/{}", name))
            .is_ok())
    }

    fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        Ok(self.repo.find_branch(name, BranchType::Local).is_ok())
    }
}

/// Committer time of a commit in UTC.
fn commit_time(commit: &git2::Commit<'_>) -> DateTime<Utc> {
    DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or(DateTime::UNIX_EPOCH)
}

fn collect_conflicts(index: &git2::Index) -> Result<Vec<ConflictEntry>, GitError> {
    let mut entries = Vec::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        let kind = match (&conflict.ancestor, &conflict.our, &conflict.their) {
            (_, Some(_), None) | (_, None, Some(_)) => ConflictKind::ModifyDelete,
            (None, Some(_), Some(_)) => ConflictKind::AddAdd,
            _ => ConflictKind::Content,
        };
        let path = [&conflict.our, &conflict.their, &conflict.ancestor]
            .into_iter()
            .flatten()
            .next()
            .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
            .unwrap_or_default();
        entries.push(ConflictEntry { path, kind });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Credential callback: explicit key, then ssh-agent, then credential helpers.
fn credential_callback<'a>(
    credentials: &'a Credentials,
    attempts: &'a Cell<u32>,
) -> impl FnMut(&str, Option<&str>, CredentialType) -> Result<Cred, git2::Error> + 'a {
    move |url, username, allowed| {
        attempts.set(attempts.get() + 1);
        if attempts.get() > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str(&format!(
                "no accepted credentials for {url}"
            )));
        }

        let user = username.unwrap_or("git");
        if allowed.contains(CredentialType::SSH_KEY) {
            return match &credentials.ssh_key {
                Some(key) => Cred::ssh_key(user, None, key, None),
                None => Cred::ssh_key_from_agent(user),
            };
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            let config = git2::Config::open_default()?;
            return Cred::credential_helper(&config, url, username);
        }
        if allowed.contains(CredentialType::USERNAME) {
            return Cred::username(user);
        }
        Cred::default()
    }
}

/// Callbacks shared by every fetch-like transfer: credentials, pack
/// download progress and server-side sideband progress.
fn transfer_callbacks<'a>(
    credentials: &'a Credentials,
    attempts: &'a Cell<u32>,
    progress: &'a RefCell<&mut ProgressMultiplexer>,
) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(credential_callback(credentials, attempts));
    callbacks.transfer_progress(move |stats| {
        let mut progress = progress.borrow_mut();
        if stats.received_objects() < stats.total_objects() {
            progress.update(
                ProgressPhase::Receiving,
                stats.received_objects() as u64,
                stats.total_objects() as u64,
                "",
            );
        } else if stats.total_deltas() > 0 {
            progress.update(
                ProgressPhase::Resolving,
                stats.indexed_deltas() as u64,
                stats.total_deltas() as u64,
                "",
            );
        } else {
            progress.update(
                ProgressPhase::Receiving,
                stats.received_objects() as u64,
                stats.total_objects() as u64,
                "",
            );
        }
        true
    });
    callbacks.sideband_progress(move |data| {
        progress
            .borrow_mut()
            .update_from_sideband(&String::from_utf8_lossy(data));
        true
    });
    callbacks
}

/// Whether `url` goes through a transport that can fetch shallow history.
///
/// libgit2's local transport (plain paths and `file://`) cannot.
fn supports_shallow(url: &str) -> bool {
    !(url.starts_with("file://") || Path::new(url).exists())
}

fn checkout_with_progress<'a>(
    progress: &'a RefCell<&mut ProgressMultiplexer>,
) -> CheckoutBuilder<'a> {
    let mut checkout = CheckoutBuilder::new();
    checkout.safe();
    checkout.progress(move |_path, current, total| {
        progress
            .borrow_mut()
            .update(ProgressPhase::CheckingOut, current as u64, total as u64, "");
    });
    checkout
}
