//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **ONLY doorway** to Git. All repository reads, writes
//! and network transfers flow through this interface. No other module should
//! import `git2`, and nothing shells out to the git CLI.
//!
//! # Responsibilities
//!
//! - Opening, initializing and cloning repositories
//! - Remote management, fetch and push with progress reporting
//! - Checkout, branch creation and tag listing
//! - History walks for merge commits
//! - Merging with conflict detection
//!
//! # Invariants
//!
//! - No other module calls git2 directly
//! - All operations return strong types (Oid, BranchName)
//! - Transfer progress is funneled through one [`ProgressMultiplexer`]
//!   per operation

mod interface;
pub mod progress;

pub use interface::{
    CommitSummary, ConflictEntry, ConflictKind, Credentials, Git, GitError, Identity,
    MergeResult, RepoQuery, WorktreeStatus,
};
pub use progress::{
    parse_sideband, ProgressIndicator, ProgressMultiplexer, ProgressPhase, ProgressSink,
    SilentProgress,
};
