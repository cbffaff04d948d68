//! sync::error
//!
//! Failures of single-repository synchronization.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::{RepoId, TypeError};
use crate::git::GitError;

/// Errors from [`RepositoryHandle`](super::RepositoryHandle) operations.
///
/// Merge conflicts met by `merge_without_commit` are reported through
/// [`MergeOutcome`](super::MergeOutcome) instead; only `pull`, which cannot
/// leave a half-merged branch behind silently, raises [`SyncError::MergeConflict`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The backend refused to create or remove a remote.
    #[error("{id}: cannot {action} remote '{name}': {source}")]
    RemoteOperation {
        id: RepoId,
        name: String,
        action: &'static str,
        #[source]
        source: GitError,
    },

    /// An operation named a remote the repository does not have.
    #[error("{id}: remote '{name}' is not configured")]
    RemoteNotConfigured { id: RepoId, name: String },

    /// An operation needs a local repository that does not exist yet.
    #[error("{id}: no local repository, clone it first")]
    NotCloned { id: RepoId },

    /// Neither a commit nor a `v`-prefixed tag matches the base token.
    #[error("{org}/{repo}: base '{token}' is neither a commit nor tag 'v{token}'")]
    BaseNotFound {
        token: String,
        org: String,
        repo: String,
    },

    /// Pulling a branch stopped on conflicts.
    #[error("{id}: merging origin/{branch} conflicted in {} path(s)", conflicts.len())]
    MergeConflict {
        id: RepoId,
        branch: String,
        conflicts: Vec<String>,
    },

    /// A branch or tag name is not a valid ref name.
    #[error(transparent)]
    InvalidName(#[from] TypeError),

    /// Any other backend failure.
    #[error(transparent)]
    Backend(#[from] GitError),

    /// Working directory could not be removed or created.
    #[error("{id}: cannot prepare {path}: {source}")]
    Io {
        id: RepoId,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Build a [`SyncError::BaseNotFound`] for `id`.
    pub fn base_not_found(token: &str, id: &RepoId) -> Self {
        SyncError::BaseNotFound {
            token: token.to_string(),
            org: id.org.clone(),
            repo: id.repo.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_not_found_mentions_tag_form() {
        let err = SyncError::base_not_found("1.2.3", &RepoId::new("acme", "api"));
        assert_eq!(
            err.to_string(),
            "acme/api: base '1.2.3' is neither a commit nor tag 'v1.2.3'"
        );
    }

    #[test]
    fn remote_not_configured_is_qualified() {
        let err = SyncError::RemoteNotConfigured {
            id: RepoId::new("acme", "api"),
            name: "mirror".to_string(),
        };
        assert_eq!(err.to_string(), "acme/api: remote 'mirror' is not configured");
    }

    #[test]
    fn merge_conflict_counts_paths() {
        let err = SyncError::MergeConflict {
            id: RepoId::new("acme", "api"),
            branch: "main".to_string(),
            conflicts: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().contains("2 path(s)"));
    }

    #[test]
    fn backend_error_is_transparent() {
        let err: SyncError = GitError::RemoteNotFound {
            name: "origin".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "remote not found: origin");
    }
}
