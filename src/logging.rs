//! logging
//!
//! Installs the global `tracing` subscriber for the binary.
//!
//! Two sinks receive every event that passes the filter:
//! - stderr, compact and colored, for the person watching the run (written
//!   around any progress bar on screen);
//! - an append-only log file that accumulates across runs, so a batch ends
//!   with a durable record of which repositories failed and why.
//!
//! `RUST_LOG` overrides the default `gitmover=info` filter.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::ui::progress::StderrLog;

/// Logging setup requested on the command line.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Lower the default filter to debug.
    pub debug: bool,
    /// Only warnings and errors on stderr (the file still gets everything).
    pub quiet: bool,
    /// Append log lines to this file.
    pub file: Option<PathBuf>,
}

/// Keeps the background file writer alive; flushes on drop.
///
/// Hold it in `main` for the whole run.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Default filter directive for the given verbosity.
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "gitmover=debug"
    } else {
        "gitmover=info"
    }
}

/// Install the global subscriber.
///
/// A log file that cannot be opened is reported on stderr and skipped;
/// logging never stops a run. Calling this twice keeps the first subscriber.
pub fn init(options: &LogOptions) -> LogGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(options.debug)));

    let stderr_level = if options.quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::TRACE
    };
    let stderr_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(|| StderrLog)
        .with_filter(stderr_level);

    let (file_layer, guard) = match options.file.as_deref().map(open_log_file) {
        Some(Ok(file)) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("warning: file logging disabled: {}", e);
            (None, None)
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    LogGuard { _file: guard }
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
