//! gitmover - Mirror and migrate collections of git repositories
//!
//! gitmover keeps a local working copy of every repository listed in a
//! manifest under `{root}/{org}/{repo}` and drives them in batch: backing
//! them up, mirroring them onto another host, building migration branches
//! from versions, snapshotting release tags, and searching history for the
//! merge that was current at a point in time.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, runs batches)
//! - [`batch`] - Manifest loading and the per-repository fold
//! - [`sync`] - [`sync::RepositoryHandle`] and the operations on one copy
//! - [`git`] - Single interface for all Git operations
//! - [`core`] - Domain types, configuration and locking
//! - [`logging`] - Subscriber setup
//! - [`ui`] - Output and progress display
//!
//! # Invariants
//!
//! 1. A working copy is only touched while its lock is held
//! 2. One repository failing never stops the batch
//! 3. Transfer progress is owned by the call that reports it

pub mod batch;
pub mod cli;
pub mod core;
pub mod git;
pub mod logging;
pub mod sync;
pub mod ui;
