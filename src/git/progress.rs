//! git::progress
//!
//! Phase-aware progress reporting for transfer operations.
//!
//! A single clone, fetch or push emits several sequential phases
//! (counting, compressing, writing or receiving, resolving deltas, checking
//! out). [`ProgressMultiplexer`] turns that stream of `(phase, current,
//! total, message)` events into one active indicator at a time: a phase
//! change closes the previous indicator and opens a new one sized to the
//! new phase's total.
//!
//! # Ownership
//!
//! A multiplexer is constructed per transfer call and dropped when the call
//! returns. There is no shared progress state between calls or handles.
//!
//! # Example
//!
//! ```
//! use gitmover::git::{ProgressMultiplexer, ProgressPhase};
//!
//! let mut progress = ProgressMultiplexer::silent();
//! progress.update(ProgressPhase::Receiving, 10, 100, "");
//! progress.update(ProgressPhase::Receiving, 100, 100, "");
//! progress.update(ProgressPhase::Resolving, 3, 20, "");
//! assert_eq!(progress.active_phase(), Some(ProgressPhase::Resolving));
//! ```

use std::sync::Arc;

/// A transfer phase reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressPhase {
    /// Enumerating objects to send or receive.
    Counting,
    /// Delta-compressing objects.
    Compressing,
    /// Uploading pack data (push).
    Writing,
    /// Downloading pack data (clone, fetch, pull).
    Receiving,
    /// Resolving deltas in a received pack.
    Resolving,
    /// Looking up delta sources on the server.
    FindingSources,
    /// Writing files into the working tree.
    CheckingOut,
}

impl ProgressPhase {
    /// Every phase, in the order a transfer normally emits them.
    pub const ALL: [ProgressPhase; 7] = [
        ProgressPhase::Counting,
        ProgressPhase::Compressing,
        ProgressPhase::FindingSources,
        ProgressPhase::Writing,
        ProgressPhase::Receiving,
        ProgressPhase::Resolving,
        ProgressPhase::CheckingOut,
    ];

    /// Human-readable phase name.
    pub fn name(self) -> &'static str {
        self.label().trim_end()
    }

    /// Display label, space-padded so every label has the same width.
    pub fn label(self) -> &'static str {
        match self {
            ProgressPhase::Counting => "Counting objects   ",
            ProgressPhase::Compressing => "Compressing objects",
            ProgressPhase::Writing => "Writing objects    ",
            ProgressPhase::Receiving => "Receiving objects  ",
            ProgressPhase::Resolving => "Resolving deltas   ",
            ProgressPhase::FindingSources => "Finding sources    ",
            ProgressPhase::CheckingOut => "Checking out files ",
        }
    }

    /// Map a server-side progress label (as sent over the sideband) to a phase.
    fn from_remote_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Counting objects" => Some(ProgressPhase::Counting),
            "Compressing objects" => Some(ProgressPhase::Compressing),
            "Finding sources" => Some(ProgressPhase::FindingSources),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One open progress indicator.
pub trait ProgressIndicator {
    /// Advance the indicator by `delta` units.
    fn advance(&mut self, delta: u64, message: &str);

    /// Close the indicator. Called exactly once.
    fn finish(&mut self);
}

/// Factory for progress indicators (terminal bar, log lines, nothing).
pub trait ProgressSink: Send + Sync {
    /// Open a new indicator with a display label and an expected total.
    fn begin(&self, label: &str, total: u64) -> Box<dyn ProgressIndicator>;
}

/// A sink that discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

struct NoopIndicator;

impl ProgressIndicator for NoopIndicator {
    fn advance(&mut self, _delta: u64, _message: &str) {}
    fn finish(&mut self) {}
}

impl ProgressSink for SilentProgress {
    fn begin(&self, _label: &str, _total: u64) -> Box<dyn ProgressIndicator> {
        Box::new(NoopIndicator)
    }
}

struct ActiveIndicator {
    phase: ProgressPhase,
    position: u64,
    indicator: Box<dyn ProgressIndicator>,
}

/// Routes phase events to at most one open indicator.
pub struct ProgressMultiplexer {
    sink: Arc<dyn ProgressSink>,
    active: Option<ActiveIndicator>,
}

impl std::fmt::Debug for ProgressMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressMultiplexer")
            .field("active", &self.active_phase())
            .finish()
    }
}

impl ProgressMultiplexer {
    /// Create a multiplexer drawing indicators from `sink`.
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink, active: None }
    }

    /// Create a multiplexer that reports nothing.
    pub fn silent() -> Self {
        Self::new(Arc::new(SilentProgress))
    }

    /// The phase of the currently open indicator, if any.
    pub fn active_phase(&self) -> Option<ProgressPhase> {
        self.active.as_ref().map(|a| a.phase)
    }

    /// Record a progress event.
    ///
    /// The first event, and any event whose phase differs from the previous
    /// one, closes the open indicator and opens a new one sized to `total`.
    /// Within a phase the indicator advances by how far `current` passes the
    /// highest count seen so far; a counter that moves backwards advances by
    /// zero.
    pub fn update(&mut self, phase: ProgressPhase, current: u64, total: u64, message: &str) {
        if self.active_phase() != Some(phase) {
            self.finish();
            self.active = Some(ActiveIndicator {
                phase,
                position: 0,
                indicator: self.sink.begin(phase.label(), total),
            });
        }

        if let Some(active) = self.active.as_mut() {
            let delta = current.saturating_sub(active.position);
            active.indicator.advance(delta, message);
            active.position = active.position.max(current);
        }
    }

    /// Feed raw sideband text from the server (`remote: Counting objects: 50% (5/10)`).
    ///
    /// Lines without a recognised phase or without a `(current/total)`
    /// counter are ignored.
    pub fn update_from_sideband(&mut self, text: &str) {
        for (phase, current, total) in parse_sideband(text) {
            self.update(phase, current, total, "");
        }
    }

    /// Close the open indicator, if any.
    pub fn finish(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.indicator.finish();
        }
    }
}

impl Drop for ProgressMultiplexer {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Parse server progress lines into `(phase, current, total)` triples.
///
/// Servers send carriage-return separated updates such as
/// `Compressing objects:  40% (2/5)\r`.
pub fn parse_sideband(text: &str) -> Vec<(ProgressPhase, u64, u64)> {
    text.split(['\r', '\n'])
        .filter_map(|line| {
            let line = line.trim_start_matches("remote:").trim();
            let (label, rest) = line.split_once(':')?;
            let phase = ProgressPhase::from_remote_label(label)?;
            let open = rest.find('(')?;
            let close = rest[open..].find(')')? + open;
            let (current, total) = rest[open + 1..close].split_once('/')?;
            Some((
                phase,
                current.trim().parse().ok()?,
                total.trim().parse().ok()?,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// What a recording sink observed, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Seen {
        Begin(String, u64),
        Advance(u64),
        Finish,
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Arc<Mutex<Vec<Seen>>>,
    }

    struct RecordingIndicator {
        seen: Arc<Mutex<Vec<Seen>>>,
    }

    impl ProgressIndicator for RecordingIndicator {
        fn advance(&mut self, delta: u64, _message: &str) {
            self.seen.lock().unwrap().push(Seen::Advance(delta));
        }

        fn finish(&mut self) {
            self.seen.lock().unwrap().push(Seen::Finish);
        }
    }

    impl ProgressSink for RecordingSink {
        fn begin(&self, label: &str, total: u64) -> Box<dyn ProgressIndicator> {
            self.seen
                .lock()
                .unwrap()
                .push(Seen::Begin(label.to_string(), total));
            Box::new(RecordingIndicator {
                seen: Arc::clone(&self.seen),
            })
        }
    }

    fn recording() -> (ProgressMultiplexer, Arc<Mutex<Vec<Seen>>>) {
        let sink = RecordingSink::default();
        let seen = Arc::clone(&sink.seen);
        (ProgressMultiplexer::new(Arc::new(sink)), seen)
    }

    mod labels {
        use super::*;

        #[test]
        fn labels_share_one_width() {
            let width = ProgressPhase::Compressing.label().len();
            for phase in ProgressPhase::ALL {
                assert_eq!(phase.label().len(), width, "{phase:?}");
            }
        }

        #[test]
        fn names_are_trimmed_labels() {
            assert_eq!(ProgressPhase::Receiving.name(), "Receiving objects");
            assert_eq!(ProgressPhase::CheckingOut.to_string(), "Checking out files");
        }
    }

    mod multiplexer {
        use super::*;

        #[test]
        fn same_phase_advances_by_difference() {
            let (mut progress, seen) = recording();
            progress.update(ProgressPhase::Receiving, 10, 100, "");
            progress.update(ProgressPhase::Receiving, 25, 100, "");
            progress.update(ProgressPhase::Receiving, 100, 100, "");
            drop(progress);

            assert_eq!(
                *seen.lock().unwrap(),
                vec![
                    Seen::Begin(ProgressPhase::Receiving.label().to_string(), 100),
                    Seen::Advance(10),
                    Seen::Advance(15),
                    Seen::Advance(75),
                    Seen::Finish,
                ]
            );
        }

        #[test]
        fn phase_change_closes_and_reopens() {
            let (mut progress, seen) = recording();
            progress.update(ProgressPhase::Counting, 5, 5, "");
            progress.update(ProgressPhase::Compressing, 2, 4, "");
            progress.finish();

            assert_eq!(
                *seen.lock().unwrap(),
                vec![
                    Seen::Begin(ProgressPhase::Counting.label().to_string(), 5),
                    Seen::Advance(5),
                    Seen::Finish,
                    Seen::Begin(ProgressPhase::Compressing.label().to_string(), 4),
                    Seen::Advance(2),
                    Seen::Finish,
                ]
            );
            assert_eq!(progress.active_phase(), None);
        }

        #[test]
        fn backwards_counter_advances_by_zero() {
            let (mut progress, seen) = recording();
            progress.update(ProgressPhase::Writing, 8, 10, "");
            progress.update(ProgressPhase::Writing, 3, 10, "");
            progress.update(ProgressPhase::Writing, 10, 10, "");
            progress.finish();

            let advances: Vec<_> = seen
                .lock()
                .unwrap()
                .iter()
                .filter_map(|s| match s {
                    Seen::Advance(d) => Some(*d),
                    _ => None,
                })
                .collect();
            assert_eq!(advances, vec![8, 0, 2]);
            assert_eq!(advances.iter().sum::<u64>(), 10);
        }

        #[test]
        fn finish_is_idempotent() {
            let (mut progress, seen) = recording();
            progress.update(ProgressPhase::Resolving, 1, 2, "");
            progress.finish();
            progress.finish();
            drop(progress);

            let finishes = seen
                .lock()
                .unwrap()
                .iter()
                .filter(|s| **s == Seen::Finish)
                .count();
            assert_eq!(finishes, 1);
        }
    }

    mod sideband {
        use super::*;

        #[test]
        fn parses_carriage_return_updates() {
            let parsed = parse_sideband(
                "Counting objects:  50% (5/10)\rCounting objects: 100% (10/10), done.\n",
            );
            assert_eq!(
                parsed,
                vec![
                    (ProgressPhase::Counting, 5, 10),
                    (ProgressPhase::Counting, 10, 10),
                ]
            );
        }

        #[test]
        fn strips_remote_prefix() {
            let parsed = parse_sideband("remote: Compressing objects:  33% (1/3)\r");
            assert_eq!(parsed, vec![(ProgressPhase::Compressing, 1, 3)]);
        }

        #[test]
        fn ignores_unknown_and_uncounted_lines() {
            assert!(parse_sideband("Enumerating objects: 10, done.\n").is_empty());
            assert!(parse_sideband("Total 10 (delta 2), reused 0\n").is_empty());
            assert!(parse_sideband("Counting objects: done\n").is_empty());
        }

        #[test]
        fn feeds_multiplexer() {
            let (mut progress, seen) = recording();
            progress.update_from_sideband("Finding sources:  50% (1/2)\r");
            assert_eq!(progress.active_phase(), Some(ProgressPhase::FindingSources));
            drop(progress);
            assert_eq!(seen.lock().unwrap().len(), 3);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Advances within one phase sum to the highest counter seen.
            #[test]
            fn advances_sum_to_maximum(counters in proptest::collection::vec(0u64..10_000, 1..50)) {
                let (mut progress, seen) = recording();
                for current in &counters {
                    progress.update(ProgressPhase::Receiving, *current, 10_000, "");
                }
                drop(progress);

                let total: u64 = seen.lock().unwrap().iter().map(|s| match s {
                    Seen::Advance(d) => *d,
                    _ => 0,
                }).sum();
                prop_assert_eq!(total, *counters.iter().max().unwrap());
            }

            /// Every opened indicator is closed exactly once.
            #[test]
            fn begins_match_finishes(phases in proptest::collection::vec(0usize..7, 0..40)) {
                let (mut progress, seen) = recording();
                for (i, idx) in phases.iter().enumerate() {
                    progress.update(ProgressPhase::ALL[*idx], i as u64, 100, "");
                }
                drop(progress);

                let seen = seen.lock().unwrap();
                let begins = seen.iter().filter(|s| matches!(s, Seen::Begin(..))).count();
                let finishes = seen.iter().filter(|s| **s == Seen::Finish).count();
                prop_assert_eq!(begins, finishes);
            }
        }
    }
}
