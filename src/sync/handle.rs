//! sync::handle
//!
//! One local working copy and everything that can be done to it.
//!
//! # Lifecycle
//!
//! A [`RepositoryHandle`] is built per repository per run. The working copy
//! at `{work_dir}/{dir_name}` outlives the handle: the next run re-opens it,
//! so every operation starts by looking at what is already on disk
//! (an earlier clone, a half-cloned directory, a stale remote) instead of
//! assuming a clean slate.
//!
//! The backend repository is opened lazily and cached. Operations that need
//! one and find none fail with [`SyncError::NotCloned`]; only
//! [`open_or_init`](RepositoryHandle::open_or_init), [`clone`](RepositoryHandle::clone)
//! and [`clone_tag`](RepositoryHandle::clone_tag) create one.
//!
//! # Progress
//!
//! Every transfer gets its own [`ProgressMultiplexer`] over the handle's
//! sink, so concurrent handles never share indicator state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::types::{BranchName, Oid, RefName, RepoId};
use crate::git::{
    CommitSummary, Credentials, Git, GitError, Identity, MergeResult, ProgressMultiplexer,
    ProgressSink, SilentProgress,
};

use super::error::SyncError;
use super::history;
use super::merge::{self, MergeOutcome};
use super::resolver;

/// Where HEAD is after a checkout, as a name a caller can reuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum HeadPosition {
    /// On a local branch.
    Branch(BranchName),
    /// Detached at a commit carrying this tag.
    Tag(String),
    /// Detached at an untagged commit.
    Detached(Oid),
}

impl HeadPosition {
    /// Name that checks out this position again.
    pub fn name(&self) -> &str {
        match self {
            HeadPosition::Branch(branch) => branch.as_str(),
            HeadPosition::Tag(tag) => tag,
            HeadPosition::Detached(oid) => oid.as_str(),
        }
    }
}

impl std::fmt::Display for HeadPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeadPosition::Branch(branch) => write!(f, "branch {}", branch),
            HeadPosition::Tag(tag) => write!(f, "tag {}", tag),
            HeadPosition::Detached(oid) => write!(f, "detached at {}", oid.short(7)),
        }
    }
}

/// A single repository's local working copy.
pub struct RepositoryHandle {
    id: RepoId,
    work_dir: PathBuf,
    dir_name: String,
    default_url: String,
    credentials: Credentials,
    identity: Identity,
    shallow_depth: Option<u32>,
    progress_sink: Arc<dyn ProgressSink>,
    repo: Option<Git>,
    /// Remotes known to exist, name to URL.
    remotes: BTreeMap<String, String>,
}

impl std::fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("id", &self.id)
            .field("path", &self.path())
            .field("open", &self.repo.is_some())
            .field("remotes", &self.remotes)
            .finish()
    }
}

impl RepositoryHandle {
    /// Create a handle for `id` whose working copy is `{work_dir}/{repo}`.
    ///
    /// `default_url` is what `origin` points at for new repositories and
    /// where clones come from. Nothing is touched on disk.
    pub fn new(id: RepoId, work_dir: impl Into<PathBuf>, default_url: impl Into<String>) -> Self {
        let dir_name = id.repo.clone();
        Self {
            id,
            work_dir: work_dir.into(),
            dir_name,
            default_url: default_url.into(),
            credentials: Credentials::default(),
            identity: Identity::default(),
            shallow_depth: Some(1),
            progress_sink: Arc::new(SilentProgress),
            repo: None,
            remotes: BTreeMap::new(),
        }
    }

    /// Use a different directory name under the work dir.
    pub fn with_dir_name(mut self, dir_name: impl Into<String>) -> Self {
        self.dir_name = dir_name.into();
        self
    }

    /// Authenticate transfers with these credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Sign merge commits with this identity when the repository has none.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// History depth of release snapshot clones; `None` for full history.
    pub fn with_shallow_depth(mut self, depth: Option<u32>) -> Self {
        self.shallow_depth = depth;
        self
    }

    /// Report transfer progress to `sink`.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress_sink = sink;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Repository identity.
    pub fn id(&self) -> &RepoId {
        &self.id
    }

    /// Working copy path.
    pub fn path(&self) -> PathBuf {
        self.work_dir.join(&self.dir_name)
    }

    /// URL `origin` gets on initialization.
    pub fn default_url(&self) -> &str {
        &self.default_url
    }

    /// Merge commit identity fallback.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Remotes known to exist, name to URL.
    pub fn remotes(&self) -> &BTreeMap<String, String> {
        &self.remotes
    }

    // =========================================================================
    // Repository lifecycle
    // =========================================================================

    /// Open the working copy, or initialize an empty repository there with
    /// `origin` at the default URL.
    pub fn open_or_init(&mut self) -> Result<(), SyncError> {
        if self.try_open()? {
            tracing::debug!("{}: opened {}", self.id, self.path().display());
            return Ok(());
        }

        let path = self.path();
        let git = Git::init(&path)?;
        tracing::info!("{}: initialized empty repository at {}", self.id, path.display());
        self.repo = Some(git);
        self.remotes.clear();

        let url = self.default_url.clone();
        self.add_remote(&url, "origin")
    }

    /// Point remote `name` at `url`, replacing any existing remote of that name.
    ///
    /// # Errors
    ///
    /// - [`SyncError::RemoteOperation`] if the backend refuses to remove or
    ///   create the remote
    pub fn add_remote(&mut self, url: &str, name: &str) -> Result<(), SyncError> {
        self.ensure_open()?;
        let git = self.git()?;

        if git.remote_url(name)?.is_some() {
            git.delete_remote(name)
                .map_err(|source| SyncError::RemoteOperation {
                    id: self.id.clone(),
                    name: name.to_string(),
                    action: "remove",
                    source,
                })?;
        }
        git.create_remote(name, url)
            .map_err(|source| SyncError::RemoteOperation {
                id: self.id.clone(),
                name: name.to_string(),
                action: "add",
                source,
            })?;

        self.remotes.insert(name.to_string(), url.to_string());
        tracing::info!("{}: remote {} -> {}", self.id, name, url);
        Ok(())
    }

    /// Clone the default URL with full history.
    ///
    /// Skipped when a repository already exists. A leftover directory that is
    /// not a repository (an interrupted clone) is removed first.
    pub fn clone(&mut self) -> Result<(), SyncError> {
        if self.try_open()? {
            tracing::info!("{}: already cloned, skipping", self.id);
            return Ok(());
        }

        let path = self.path();
        self.remove_work_dir(&path)?;

        let mut progress = self.progress();
        let git = Git::clone_from(&self.default_url, &path, &self.credentials, &mut progress)?;
        self.repo = Some(git);
        self.refresh_remotes()?;

        tracing::info!("{}: cloned {}", self.id, self.default_url);
        Ok(())
    }

    /// Replace the working copy with a snapshot of `tag`.
    ///
    /// Skipped when HEAD's commit already carries `tag`. Otherwise the
    /// working directory is deleted and the tag alone is fetched (at the
    /// configured shallow depth) and checked out detached.
    pub fn clone_tag(&mut self, tag: &str) -> Result<(), SyncError> {
        if self.try_open()? && self.git()?.head_is_tagged(tag)? {
            tracing::info!("{}: already at {}, skipping", self.id, tag);
            return Ok(());
        }

        let refspec = tag_refspec(tag)?;
        let path = self.path();
        self.repo = None;
        self.remotes.clear();
        self.remove_work_dir(&path)?;

        let git = Git::init(&path)?;
        git.create_remote("origin", &self.default_url)
            .map_err(|source| SyncError::RemoteOperation {
                id: self.id.clone(),
                name: "origin".to_string(),
                action: "add",
                source,
            })?;
        let mut progress = self.progress();
        git.fetch(
            "origin",
            &[refspec],
            self.shallow_depth,
            &self.credentials,
            &mut progress,
        )?;
        git.checkout(tag, &mut self.progress())?;

        self.repo = Some(git);
        self.refresh_remotes()?;
        match self.shallow_depth {
            Some(depth) => tracing::info!("{}: cloned {} at depth {}", self.id, tag, depth),
            None => tracing::info!("{}: cloned {}", self.id, tag),
        }
        Ok(())
    }

    /// Check out `tag` after fetching it from remote `dest`.
    ///
    /// Skipped when HEAD's commit already carries `tag`. Unlike
    /// [`clone_tag`](Self::clone_tag) the working copy and its history are kept.
    pub fn checkout_tag(&mut self, dest: &str, tag: &str) -> Result<(), SyncError> {
        self.ensure_open()?;
        if self.git()?.head_is_tagged(tag)? {
            tracing::info!("{}: already at {}, skipping", self.id, tag);
            return Ok(());
        }
        self.ensure_remote(dest)?;

        let refspec = tag_refspec(tag)?;
        let mut progress = self.progress();
        self.git()?
            .fetch(dest, &[refspec], None, &self.credentials, &mut progress)?;
        self.checkout(tag)?;
        Ok(())
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Check out a local branch, remote-tracking branch, tag or commit.
    pub fn checkout(&mut self, name: &str) -> Result<HeadPosition, SyncError> {
        self.ensure_open()?;
        let mut progress = self.progress();
        self.git()?.checkout(name, &mut progress)?;

        let position = self.head_position()?;
        tracing::info!("{}: checked out {} ({})", self.id, name, position);
        Ok(position)
    }

    /// Check out the branch `origin` advertises as its HEAD.
    ///
    /// Returns `Ok(None)` without touching the working tree when the remote
    /// does not advertise a single default branch (an empty repository).
    pub fn checkout_active_branch(&mut self) -> Result<Option<HeadPosition>, SyncError> {
        self.ensure_open()?;
        self.ensure_remote("origin")?;

        let advertised = self
            .git()?
            .remote_default_branch("origin", &self.credentials)?;
        match advertised {
            Some(branch) => self.checkout(&branch).map(Some),
            None => {
                tracing::debug!("{}: origin advertises no default branch", self.id);
                Ok(None)
            }
        }
    }

    /// Check out `new_branch`, creating it from `base` if needed.
    ///
    /// `base` is a commit or a bare version standing for tag `v{base}`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::BaseNotFound`] if the branch is new and nothing
    ///   resolves `base`
    pub fn checkout_new_branch(
        &mut self,
        base: &str,
        new_branch: &str,
    ) -> Result<HeadPosition, SyncError> {
        resolver::resolve_and_branch(self, base, new_branch)
    }

    /// Current HEAD position.
    pub fn head_position(&mut self) -> Result<HeadPosition, SyncError> {
        self.ensure_open()?;
        let git = self.git()?;

        if git.is_head_detached()? {
            let oid = git.head_oid()?;
            return Ok(match git.tags_pointing_at(&oid)?.into_iter().next() {
                Some(tag) => HeadPosition::Tag(tag),
                None => HeadPosition::Detached(oid),
            });
        }

        match git.current_branch()? {
            Some(branch) => Ok(HeadPosition::Branch(branch)),
            None => Err(GitError::RefNotFound {
                refname: "HEAD".to_string(),
            }
            .into()),
        }
    }

    pub(crate) fn create_branch_at_head(&mut self, branch: &BranchName) -> Result<(), SyncError> {
        self.ensure_open()?;
        let git = self.git()?;
        git.create_branch(branch, &git.head_oid()?)?;
        Ok(())
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Fetch everything from `remote`, including all tags.
    ///
    /// # Errors
    ///
    /// - [`SyncError::RemoteNotConfigured`] for an unknown remote
    pub fn fetch(&mut self, remote: &str) -> Result<(), SyncError> {
        self.ensure_open()?;
        self.ensure_remote(remote)?;

        let mut progress = self.progress();
        self.git()?
            .fetch(remote, &[], None, &self.credentials, &mut progress)?;
        tracing::info!("{}: fetched {}", self.id, remote);
        Ok(())
    }

    /// Bring local `branch` up to date with `origin`.
    ///
    /// The branch is fetched, checked out (created from `origin/branch` when
    /// missing locally) and merged with its upstream.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotCloned`] if there is no local repository
    /// - [`SyncError::MergeConflict`] if the merge stops on conflicts
    pub fn pull(&mut self, branch: &str) -> Result<(), SyncError> {
        self.ensure_open()?;
        self.ensure_remote("origin")?;

        let name = BranchName::new(branch)?;
        let upstream = RefName::for_remote_branch("origin", &name);
        let refspec = format!("+{}:{}", RefName::for_branch(&name), upstream);
        let mut progress = self.progress();
        self.git()?
            .fetch("origin", &[refspec], None, &self.credentials, &mut progress)?;

        self.checkout(branch)?;
        let result = self.git()?.merge(upstream.as_str(), &self.identity)?;
        match result {
            MergeResult::Conflicted(entries) => Err(SyncError::MergeConflict {
                id: self.id.clone(),
                branch: branch.to_string(),
                conflicts: entries.iter().map(ToString::to_string).collect(),
            }),
            result => {
                tracing::info!("{}: pulled {} ({:?})", self.id, branch, result);
                Ok(())
            }
        }
    }

    /// Force `remote_to`'s `branch` to what `remote_from`'s `branch` was when
    /// last fetched.
    ///
    /// The pushed ref is the remote-tracking `refs/remotes/{remote_from}/{branch}`,
    /// so no local branch has to track it beforehand; the branch is still
    /// checked out so the working copy reflects what was pushed.
    pub fn push_branch(
        &mut self,
        remote_from: &str,
        remote_to: &str,
        branch: &str,
    ) -> Result<(), SyncError> {
        self.ensure_open()?;
        self.ensure_remote(remote_to)?;
        self.checkout(branch)?;

        let name = BranchName::new(branch)?;
        let source = RefName::for_remote_branch(remote_from, &name);
        if self.git()?.try_resolve_ref(source.as_str())?.is_none() {
            return Err(GitError::RefNotFound {
                refname: source.to_string(),
            }
            .into());
        }

        let refspec = format!("+{}:{}", source, RefName::for_branch(&name));
        self.push_refspecs(remote_to, &[refspec])?;
        tracing::info!(
            "{}: pushed {}/{} to {}",
            self.id,
            remote_from,
            branch,
            remote_to
        );
        Ok(())
    }

    /// Force-push one tag to `remote_to`.
    pub fn push_tag(&mut self, remote_to: &str, tag: &str) -> Result<(), SyncError> {
        self.ensure_open()?;
        self.ensure_remote(remote_to)?;

        let tag_ref = RefName::for_tag(tag)?;
        if self.git()?.try_resolve_ref(tag_ref.as_str())?.is_none() {
            return Err(GitError::RefNotFound {
                refname: tag_ref.to_string(),
            }
            .into());
        }

        self.push_refspecs(remote_to, &[format!("+{tag_ref}:{tag_ref}")])?;
        tracing::info!("{}: pushed tag {} to {}", self.id, tag, remote_to);
        Ok(())
    }

    /// Force-push every local tag to `remote_to`.
    pub fn push_all_tags(&mut self, remote_to: &str) -> Result<(), SyncError> {
        self.ensure_open()?;
        self.ensure_remote(remote_to)?;

        let refspecs = self
            .git()?
            .list_tags()?
            .iter()
            .map(|tag| RefName::for_tag(tag).map(|r| format!("+{r}:{r}")))
            .collect::<Result<Vec<_>, _>>()?;

        self.push_refspecs(remote_to, &refspecs)?;
        tracing::info!("{}: pushed {} tag(s) to {}", self.id, refspecs.len(), remote_to);
        Ok(())
    }

    /// Force-push every local branch to `remote_to`.
    pub fn push_all_branches(&mut self, remote_to: &str) -> Result<(), SyncError> {
        self.ensure_open()?;
        self.ensure_remote(remote_to)?;

        let refspecs: Vec<String> = self
            .git()?
            .list_branches()?
            .iter()
            .map(|branch| {
                let r = RefName::for_branch(branch);
                format!("+{r}:{r}")
            })
            .collect();

        self.push_refspecs(remote_to, &refspecs)?;
        tracing::info!(
            "{}: pushed {} branch(es) to {}",
            self.id,
            refspecs.len(),
            remote_to
        );
        Ok(())
    }

    fn push_refspecs(&self, remote: &str, refspecs: &[String]) -> Result<(), SyncError> {
        let mut progress = self.progress();
        self.git()?
            .push(remote, refspecs, &self.credentials, &mut progress)?;
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Remote-tracking branch names of `remote`, without the remote prefix.
    pub fn get_branches(&mut self, remote: &str) -> Result<Vec<String>, SyncError> {
        self.ensure_open()?;
        self.ensure_remote(remote)?;
        Ok(self.git()?.list_remote_branches(remote)?)
    }

    /// Tag names known locally, as fetched from `remote` and any other remote.
    ///
    /// Tags are not namespaced per remote; `remote` must still exist.
    pub fn get_tags(&mut self, remote: &str) -> Result<Vec<String>, SyncError> {
        self.ensure_open()?;
        self.ensure_remote(remote)?;
        Ok(self.git()?.list_tags()?)
    }

    /// Whether tracked files have uncommitted changes.
    pub fn is_dirty(&mut self) -> Result<bool, SyncError> {
        self.ensure_open()?;
        Ok(self.git()?.is_dirty()?)
    }

    /// Committer time of HEAD's commit.
    pub fn head_commit_time(&mut self) -> Result<DateTime<Utc>, SyncError> {
        self.ensure_open()?;
        Ok(self.git()?.head_commit_time()?)
    }

    /// Latest merge commit reachable from `refname` committed before `threshold`.
    pub fn find_latest_merge_before(
        &mut self,
        refname: &str,
        threshold: DateTime<Utc>,
    ) -> Result<Option<CommitSummary>, SyncError> {
        let git = self.local()?;
        Ok(history::find_latest_merge_before(git, refname, threshold)?)
    }

    /// Merge `branch` into the current branch, classifying the result.
    pub fn merge_without_commit(&mut self, branch: &str) -> MergeOutcome {
        merge::merge_without_commit(self, branch)
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Open the repository if one exists on disk.
    ///
    /// Returns `Ok(false)` when the working copy holds no repository.
    fn try_open(&mut self) -> Result<bool, SyncError> {
        if self.repo.is_some() {
            return Ok(true);
        }

        match Git::open(&self.path()) {
            Ok(git) => {
                self.repo = Some(git);
                self.refresh_remotes()?;
                Ok(true)
            }
            Err(GitError::NotARepo { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_open(&mut self) -> Result<(), SyncError> {
        if self.try_open()? {
            Ok(())
        } else {
            Err(SyncError::NotCloned {
                id: self.id.clone(),
            })
        }
    }

    fn git(&self) -> Result<&Git, SyncError> {
        self.repo.as_ref().ok_or_else(|| SyncError::NotCloned {
            id: self.id.clone(),
        })
    }

    /// The opened repository, opening it on first use.
    pub(crate) fn local(&mut self) -> Result<&Git, SyncError> {
        self.ensure_open()?;
        self.git()
    }

    fn ensure_remote(&self, name: &str) -> Result<(), SyncError> {
        match self.git()?.remote_url(name)? {
            Some(_) => Ok(()),
            None => Err(SyncError::RemoteNotConfigured {
                id: self.id.clone(),
                name: name.to_string(),
            }),
        }
    }

    fn refresh_remotes(&mut self) -> Result<(), SyncError> {
        let git = self.git()?;
        let mut remotes = BTreeMap::new();
        for name in git.remote_names()? {
            if let Some(url) = git.remote_url(&name)? {
                remotes.insert(name, url);
            }
        }
        self.remotes = remotes;
        Ok(())
    }

    fn remove_work_dir(&self, path: &Path) -> Result<(), SyncError> {
        if !path.exists() {
            return Ok(());
        }
        fs::remove_dir_all(path).map_err(|source| SyncError::Io {
            id: self.id.clone(),
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("{}: removed {}", self.id, path.display());
        Ok(())
    }

    fn progress(&self) -> ProgressMultiplexer {
        ProgressMultiplexer::new(Arc::clone(&self.progress_sink))
    }
}

/// Force refspec copying tag `tag` to the same name.
fn tag_refspec(tag: &str) -> Result<String, SyncError> {
    let tag_ref = RefName::for_tag(tag)?;
    Ok(format!("+{tag_ref}:{tag_ref}"))
}
