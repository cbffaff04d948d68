//! ui::progress
//!
//! Terminal progress bars for git transfers.
//!
//! Bars are redrawn in place on stderr with a carriage return and only when
//! stderr is a terminal; redirected output and `--quiet` get
//! [`SilentProgress`] instead.
//!
//! Log lines share stderr with the bar. They go through [`StderrLog`], which
//! clears the half-drawn bar, writes the record and draws the bar again below
//! it.

use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::git::{ProgressIndicator, ProgressSink, SilentProgress};

/// Width of the bar between the brackets.
const BAR_WIDTH: usize = 30;

/// Carriage return plus "erase entire line".
const CLEAR_LINE: &str = "\r\x1b[2K";

/// The bar line currently drawn on stderr, if any.
static DRAWN: Mutex<Option<String>> = Mutex::new(None);

fn drawn() -> MutexGuard<'static, Option<String>> {
    DRAWN.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// stderr writer for log records that keeps an in-place bar intact.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrLog;

impl Write for StderrLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let drawn = drawn();
        let mut stderr = io::stderr().lock();
        write_over_bar(&mut stderr, drawn.as_deref(), buf)?;
        stderr.flush()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Write `buf` on its own line above `bar`, then redraw `bar`.
fn write_over_bar<W: Write>(out: &mut W, bar: Option<&str>, buf: &[u8]) -> io::Result<()> {
    let Some(bar) = bar else {
        return out.write_all(buf);
    };
    out.write_all(CLEAR_LINE.as_bytes())?;
    out.write_all(buf)?;
    if !buf.ends_with(b"\n") {
        out.write_all(b"\n")?;
    }
    out.write_all(bar.as_bytes())
}

/// Pick the progress sink for this run.
pub fn sink_for_stderr(quiet: bool) -> Arc<dyn ProgressSink> {
    if !quiet && std::io::stderr().is_terminal() {
        Arc::new(TerminalProgress)
    } else {
        Arc::new(SilentProgress)
    }
}

/// Draws one bar per transfer phase on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalProgress;

impl ProgressSink for TerminalProgress {
    fn begin(&self, label: &str, total: u64) -> Box<dyn ProgressIndicator> {
        Box::new(TerminalBar {
            label: label.to_string(),
            total,
            position: 0,
            message: String::new(),
        })
    }
}

struct TerminalBar {
    label: String,
    total: u64,
    position: u64,
    message: String,
}

impl TerminalBar {
    fn draw(&self) {
        let line = render_line(&self.label, self.position, self.total, &self.message);
        let mut drawn = drawn();
        let mut stderr = io::stderr().lock();
        let _ = write!(stderr, "{CLEAR_LINE}{line}");
        let _ = stderr.flush();
        *drawn = Some(line);
    }
}

impl ProgressIndicator for TerminalBar {
    fn advance(&mut self, delta: u64, message: &str) {
        self.position = self.position.saturating_add(delta);
        if !message.is_empty() {
            self.message = message.to_string();
        }
        self.draw();
    }

    fn finish(&mut self) {
        self.draw();
        let mut drawn = drawn();
        let _ = writeln!(io::stderr());
        *drawn = None;
    }
}

/// Render one progress line.
///
/// A phase with an unknown total (zero) shows only the running count.
pub fn render_line(label: &str, position: u64, total: u64, message: &str) -> String {
    let mut line = if total == 0 {
        format!("{label} {position}")
    } else {
        let position = position.min(total);
        let filled = (position as u128 * BAR_WIDTH as u128 / total as u128) as usize;
        let percent = position as u128 * 100 / total as u128;
        format!(
            "{label} [{}{}] {percent:>3}% ({position}/{total})",
            "#".repeat(filled),
            " ".repeat(BAR_WIDTH - filled)
        )
    };
    if !message.is_empty() {
        line.push(' ');
        line.push_str(message);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_way_bar() {
        let line = render_line("Receiving objects", 5, 10, "");
        assert_eq!(
            line,
            format!(
                "Receiving objects [{}{}]  50% (5/10)",
                "#".repeat(15),
                " ".repeat(15)
            )
        );
    }

    #[test]
    fn complete_bar_is_full() {
        let line = render_line("Writing objects", 7, 7, "");
        assert!(line.contains(&"#".repeat(BAR_WIDTH)));
        assert!(line.ends_with("100% (7/7)"));
    }

    #[test]
    fn overshoot_clamped() {
        let line = render_line("Checking out files", 12, 10, "");
        assert!(line.ends_with("100% (10/10)"));
    }

    #[test]
    fn unknown_total_shows_count() {
        assert_eq!(render_line("Counting objects", 42, 0, ""), "Counting objects 42");
    }

    mod log_lines {
        use super::*;

        fn written(bar: Option<&str>, record: &str) -> String {
            let mut out = Vec::new();
            write_over_bar(&mut out, bar, record.as_bytes()).unwrap();
            String::from_utf8(out).unwrap()
        }

        #[test]
        fn passes_through_without_bar() {
            assert_eq!(written(None, "INFO fetched\n"), "INFO fetched\n");
        }

        #[test]
        fn clears_and_redraws_bar() {
            let bar = "Receiving objects 3";
            assert_eq!(
                written(Some(bar), "INFO fetched\n"),
                format!("{CLEAR_LINE}INFO fetched\n{bar}")
            );
        }

        #[test]
        fn record_always_ends_its_line() {
            let out = written(Some("Writing objects 1"), "WARN partial");
            assert!(out.ends_with("WARN partial\nWriting objects 1"));
        }
    }

    #[test]
    fn message_appended() {
        let line = render_line("Resolving deltas", 1, 2, "done");
        assert!(line.ends_with(" done"));
    }
}
