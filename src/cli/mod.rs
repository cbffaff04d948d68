//! cli
//!
//! Command-line interface layer for gitmover.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Resolve configuration and install logging
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Repository work happens in [`crate::batch`]
//! workflows driving [`crate::sync::RepositoryHandle`]; handlers only build
//! the work list and print the report.

pub mod args;
pub mod commands;

pub use args::Cli;

use anyhow::{Context as _, Result};

use crate::core::config::Config;
use crate::logging::{self, LogOptions};
use crate::ui::output::Verbosity;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    if let Some(root) = &cli.root {
        config = config.with_root(root.clone());
    }
    let root = config.root().context("Failed to resolve working root")?;

    let _guard = logging::init(&LogOptions {
        debug: cli.debug,
        quiet: cli.quiet,
        file: config.log_file().ok(),
    });
    if let Some(path) = config.loaded_from() {
        tracing::debug!("configuration loaded from {}", path.display());
    }
    tracing::debug!("working root is {}", root.display());

    let ctx = commands::Context {
        config,
        root,
        verbosity: Verbosity::from_flags(cli.quiet, cli.debug),
        json: cli.json,
    };

    commands::dispatch(cli.command, &ctx)
}
