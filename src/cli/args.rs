//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Read configuration from this file
//! - `--root <path>`: Working root for `{org}/{repo}` copies
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output
//! - `--json`: Print the batch report as JSON

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// gitmover - Mirror and migrate collections of git repositories
#[derive(Parser, Debug)]
#[command(name = "gitmover")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of the default locations
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Working root holding {org}/{repo} copies (overrides config)
    #[arg(long, global = true, value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output; no progress bars, only warnings on stderr
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print the batch report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Manifest selection shared by every batch command.
#[derive(Args, Debug, Clone)]
pub struct ManifestArg {
    /// TOML file listing organizations and repositories
    #[arg(long, short, value_name = "FILE")]
    pub manifest: PathBuf,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch every repository and check out its default branch
    #[command(
        name = "backup",
        long_about = "Fetch every repository in the manifest into the working root.\n\n\
            Each repository is opened (or initialized) at {root}/{org}/{repo}, its \
            origin remote is pointed at the configured URL and fetched, and when \
            origin has branches its default branch is checked out.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Back up everything listed in repos.toml
    gitmover backup --manifest repos.toml

    # Use a different working root for this run
    gitmover --root /srv/backups backup --manifest repos.toml"
    )]
    Backup {
        #[command(flatten)]
        manifest: ManifestArg,
    },

    /// Replicate all branches and tags onto another host
    #[command(
        name = "mirror",
        long_about = "Replicate every branch and tag of each repository onto a mirror.\n\n\
            Origin is fetched, a remote named 'mirror' is set to the rendered --to \
            template, every origin branch is force-pushed to it and all tags follow. \
            The template accepts {host}, {org} and {repo}.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Mirror into another organization on the same host
    gitmover mirror --manifest repos.toml --to 'git@{host}:acme-archive/{repo}.git'

    # Mirror into local bare repositories
    gitmover mirror --manifest repos.toml --to '/srv/mirrors/{org}/{repo}.git'"
    )]
    Mirror {
        #[command(flatten)]
        manifest: ManifestArg,

        /// URL template of the mirror remote
        #[arg(long, value_name = "TEMPLATE")]
        to: String,
    },

    /// Build a branch from a commit or version and optionally merge and push
    #[command(
        name = "migrate",
        long_about = "Build a migration branch in every repository.\n\n\
            --base is a commit id, a tag name, or a bare version that is tried as \
            'v<version>'. The branch is checked out if it already exists, otherwise \
            created at the base. --merge merges another branch into it; a conflict is \
            reported and the branch is left unpushed. --push pushes all local \
            branches to the given remote.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Start release-branch at v1.2.3 (or the tag 1.2.3)
    gitmover migrate --manifest repos.toml --base 1.2.3 --branch release-branch

    # Merge develop into it and push the result
    gitmover migrate --manifest repos.toml --base 1.2.3 --branch release-branch \\
        --merge develop --push origin"
    )]
    Migrate {
        #[command(flatten)]
        manifest: ManifestArg,

        /// Commit id, tag, or bare version to start from
        #[arg(long, value_name = "TOKEN")]
        base: String,

        /// Branch to check out or create
        #[arg(long, value_name = "NAME")]
        branch: String,

        /// Branch to merge into the new branch
        #[arg(long, value_name = "BRANCH")]
        merge: Option<String>,

        /// Remote to push all branches to
        #[arg(long, value_name = "REMOTE")]
        push: Option<String>,
    },

    /// Replace each working copy with a snapshot of a tag
    #[command(
        name = "release",
        long_about = "Replace each working copy with a shallow snapshot of a tag.\n\n\
            A copy whose HEAD is already tagged is left alone. Otherwise the working \
            directory is deleted and recreated holding only the tag.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Snapshot v2.0.0 everywhere
    gitmover release --manifest repos.toml --tag v2.0.0"
    )]
    Release {
        #[command(flatten)]
        manifest: ManifestArg,

        /// Tag to snapshot
        #[arg(long, value_name = "TAG")]
        tag: String,
    },

    /// Report the latest merge commit before a point in time
    #[command(
        name = "find-merge",
        long_about = "Report the latest merge commit reachable from a ref that was \
            committed strictly before the given time.\n\n\
            Searches the local copies only; run backup first to bring them up to date.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Which merge was on main at the start of the year?
    gitmover find-merge --manifest repos.toml --ref main --before 2024-01-01T00:00:00Z

    # Same, as JSON for scripting
    gitmover --json find-merge --manifest repos.toml --ref origin/main \\
        --before 2024-01-01T00:00:00Z"
    )]
    FindMerge {
        #[command(flatten)]
        manifest: ManifestArg,

        /// Ref to walk back from
        #[arg(long = "ref", value_name = "REF")]
        refname: String,

        /// RFC 3339 timestamp; merges at or after it are ignored
        #[arg(long, value_name = "TIME", value_parser = parse_timestamp)]
        before: DateTime<Utc>,
    },
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}
