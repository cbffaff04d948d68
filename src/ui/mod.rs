//! ui
//!
//! User-facing output.
//!
//! # Modules
//!
//! - [`output`] - Result printing and verbosity
//! - [`progress`] - Terminal progress bars for transfers
//!
//! # Design
//!
//! All terminal output goes through this module so that `--quiet` and
//! `--json` are honored in one place.

pub mod output;
pub mod progress;
