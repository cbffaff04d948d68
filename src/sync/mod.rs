//! sync
//!
//! The repository-synchronization engine.
//!
//! # Modules
//!
//! - [`handle`] - [`RepositoryHandle`], one working copy's lifecycle and transfers
//! - [`resolver`] - Base token resolution and branch creation
//! - [`history`] - Bounded search for a historical merge commit
//! - [`merge`] - Merging with typed, non-fatal conflict outcomes
//!
//! # Error Policy
//!
//! Remote, clone, fetch, pull and push failures propagate as [`SyncError`]
//! so a batch can log them and move on to the next repository. Merge
//! conflicts are expected and come back as [`MergeOutcome`] values.
//!
//! # Example
//!
//! ```ignore
//! use gitmover::core::types::RepoId;
//! use gitmover::sync::RepositoryHandle;
//!
//! let mut handle = RepositoryHandle::new(
//!     RepoId::new("acme", "api"),
//!     "/work/acme",
//!     "git@github.com:acme/api.git",
//! );
//! handle.open_or_init()?;
//! handle.fetch("origin")?;
//! handle.checkout_new_branch("1.2.3", "release-branch")?;
//! ```

pub mod error;
pub mod handle;
pub mod history;
pub mod merge;
pub mod resolver;

pub use error::SyncError;
pub use handle::{HeadPosition, RepositoryHandle};
pub use merge::{CleanMerge, MergeOutcome};
pub use resolver::{BaseTarget, BranchPlan};
