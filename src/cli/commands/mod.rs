//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Loads the manifest into a work list
//! 2. Runs its workflow over the list through [`crate::batch::run`]
//! 3. Prints the report
//!
//! A run where any repository failed ends with an error, so the binary
//! exits non-zero after the full report has been printed.

mod backup;
mod find_merge;
mod migrate;
mod mirror;
mod release;
mod report;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use crate::batch::workflows::{HandleSettings, MigrateOptions};
use crate::batch::{Manifest, WorkItem};
use crate::cli::args::Command;
use crate::core::config::Config;
use crate::ui::output::Verbosity;
use crate::ui::progress::sink_for_stderr;

/// Everything a handler needs besides its own arguments.
#[derive(Debug)]
pub struct Context {
    /// Resolved configuration
    pub config: Config,
    /// Working root
    pub root: PathBuf,
    /// Output verbosity
    pub verbosity: Verbosity,
    /// Print reports as JSON
    pub json: bool,
}

impl Context {
    /// Enabled repositories of a manifest, with their `origin` URLs.
    fn work_items(&self, manifest: &Path) -> Result<Vec<WorkItem>> {
        let manifest = Manifest::load(manifest)?;
        let items = manifest.work_items(|org, repo| self.config.repo_url(org, repo));
        tracing::debug!("{} repositories to process", items.len());
        Ok(items)
    }

    /// Handle settings shared by every repository in the run.
    fn handle_settings(&self) -> Result<HandleSettings> {
        Ok(HandleSettings {
            root: self.root.clone(),
            credentials: self
                .config
                .credentials()
                .context("Failed to resolve credentials")?,
            identity: self.config.identity(),
            shallow_depth: self.config.shallow_depth(),
            progress: sink_for_stderr(self.verbosity == Verbosity::Quiet),
        })
    }
}

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Backup { manifest } => backup::backup(ctx, &manifest.manifest),
        Command::Mirror { manifest, to } => mirror::mirror(ctx, &manifest.manifest, &to),
        Command::Migrate {
            manifest,
            base,
            branch,
            merge,
            push,
        } => migrate::migrate(
            ctx,
            &manifest.manifest,
            &MigrateOptions {
                base,
                branch,
                merge,
                push,
            },
        ),
        Command::Release { manifest, tag } => release::release(ctx, &manifest.manifest, &tag),
        Command::FindMerge {
            manifest,
            refname,
            before,
        } => find_merge::find_merge(ctx, &manifest.manifest, &refname, before),
    }
}
