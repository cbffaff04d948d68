//! core
//!
//! Core domain types, configuration and locking for gitmover.
//!
//! # Modules
//!
//! - [`types`] - Strong types: RepoId, BranchName, Oid, RefName
//! - [`config`] - Configuration schema and loading
//! - [`lock`] - Exclusive per-repository lock
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing

pub mod config;
pub mod lock;
pub mod types;
