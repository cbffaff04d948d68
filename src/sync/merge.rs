//! sync::merge
//!
//! Merging into the current branch without derailing a batch.
//!
//! Conflicts are common and individually recoverable when migrating many
//! repositories, so a merge never fails past this module: every result,
//! including backend errors, becomes a [`MergeOutcome`] and a log line.

use serde::Serialize;

use crate::core::types::Oid;
use crate::git::{GitError, MergeResult};

use super::handle::RepositoryHandle;

/// How a clean merge changed HEAD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "oid")]
pub enum CleanMerge {
    /// Nothing to merge.
    UpToDate,
    /// HEAD moved forward.
    FastForward(Oid),
    /// A merge commit was created.
    Committed(Oid),
}

/// Result of [`merge_without_commit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum MergeOutcome {
    /// The merge completed.
    Clean { merge: CleanMerge },
    /// The merge stopped on conflicts, one diagnostic line per path.
    Conflicted { conflicts: Vec<String> },
    /// Any other backend failure.
    Failed { message: String },
}

impl MergeOutcome {
    /// Whether the merge completed.
    pub fn is_clean(&self) -> bool {
        matches!(self, MergeOutcome::Clean { .. })
    }
}

/// Map a backend merge result to an outcome.
///
/// This is the only place that knows how the backend reports conflicts.
pub fn classify(result: Result<MergeResult, GitError>) -> MergeOutcome {
    match result {
        Ok(MergeResult::UpToDate) => MergeOutcome::Clean {
            merge: CleanMerge::UpToDate,
        },
        Ok(MergeResult::FastForward(oid)) => MergeOutcome::Clean {
            merge: CleanMerge::FastForward(oid),
        },
        Ok(MergeResult::Merged(oid)) => MergeOutcome::Clean {
            merge: CleanMerge::Committed(oid),
        },
        Ok(MergeResult::Conflicted(entries)) => MergeOutcome::Conflicted {
            conflicts: entries.iter().map(ToString::to_string).collect(),
        },
        Err(err) => MergeOutcome::Failed {
            message: err.to_string(),
        },
    }
}

/// Merge `branch` into the current branch.
///
/// A clean merge is committed (or fast-forwarded). On conflict the
/// repository is left mid-merge with markers in the working tree, for a
/// person to resolve.
pub fn merge_without_commit(handle: &mut RepositoryHandle, branch: &str) -> MergeOutcome {
    let id = handle.id().clone();
    let identity = handle.identity().clone();

    let result = match handle.local() {
        Ok(git) => git.merge(branch, &identity),
        Err(err) => {
            tracing::error!("{id}: cannot merge {branch}: {err}");
            return MergeOutcome::Failed {
                message: err.to_string(),
            };
        }
    };

    let outcome = classify(result);
    match &outcome {
        MergeOutcome::Clean { merge } => {
            tracing::info!("{id}: merged {branch} ({merge:?})");
        }
        MergeOutcome::Conflicted { conflicts } => {
            tracing::error!("{id}: automatic merge of {branch} failed");
            for line in conflicts {
                tracing::error!("{id}: {line}");
            }
        }
        MergeOutcome::Failed { message } => {
            tracing::error!("{id}: merge of {branch} failed: {message}");
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{ConflictEntry, ConflictKind};

    fn oid() -> Oid {
        Oid::new("fedcba9876543210fedcba9876543210fedcba98").unwrap()
    }

    #[test]
    fn fast_forward_is_clean() {
        let outcome = classify(Ok(MergeResult::FastForward(oid())));
        assert_eq!(
            outcome,
            MergeOutcome::Clean {
                merge: CleanMerge::FastForward(oid())
            }
        );
        assert!(outcome.is_clean());
    }

    #[test]
    fn conflicts_become_lines() {
        let outcome = classify(Ok(MergeResult::Conflicted(vec![
            ConflictEntry {
                path: "README.md".to_string(),
                kind: ConflictKind::Content,
            },
            ConflictEntry {
                path: "src/new.rs".to_string(),
                kind: ConflictKind::AddAdd,
            },
        ])));

        let MergeOutcome::Conflicted { conflicts } = outcome else {
            panic!("expected conflict, got {outcome:?}");
        };
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts[0].contains("README.md"));
        assert!(conflicts[1].starts_with("CONFLICT (add/add)"));
    }

    #[test]
    fn backend_error_is_failed() {
        let outcome = classify(Err(GitError::RefNotFound {
            refname: "nope".to_string(),
        }));
        assert_eq!(
            outcome,
            MergeOutcome::Failed {
                message: "ref not found: nope".to_string()
            }
        );
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_value(classify(Ok(MergeResult::UpToDate))).unwrap();
        assert_eq!(json["outcome"], "clean");
        assert_eq!(json["merge"]["kind"], "up_to_date");
    }
}
