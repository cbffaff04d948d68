//! sync::history
//!
//! Bounded search for the latest merge commit before a point in time.
//!
//! Walking a whole multi-year history is wasteful when the answer is almost
//! always recent, so the search looks at a small window of merge commits
//! first and widens it only while nothing qualifies:
//! 50, 100, 150, ... up to [`MAX_WINDOW`].

use chrono::{DateTime, Utc};

use crate::git::{CommitSummary, GitError, RepoQuery};

/// Merge commits examined by the first window.
pub const INITIAL_WINDOW: usize = 50;

/// Growth of the window on each widening.
pub const WINDOW_STEP: usize = 50;

/// Hard ceiling on examined merge commits.
pub const MAX_WINDOW: usize = 5000;

/// Find the most recent merge commit reachable from `refname` that was
/// committed strictly before `threshold`.
///
/// Each widening only examines merge commits the previous window had not
/// reached. The search ends early once the history holds fewer merges than
/// the window asked for.
///
/// Returns `Ok(None)` when no merge qualifies within [`MAX_WINDOW`].
pub fn find_latest_merge_before<Q>(
    repo: &Q,
    refname: &str,
    threshold: DateTime<Utc>,
) -> Result<Option<CommitSummary>, GitError>
where
    Q: RepoQuery + ?Sized,
{
    let mut window = INITIAL_WINDOW;
    let mut examined = 0;

    loop {
        let merges = repo.merge_commits(refname, window)?;

        if let Some(found) = merges
            .iter()
            .skip(examined)
            .find(|commit| commit.committed_at < threshold)
        {
            return Ok(Some(found.clone()));
        }

        if merges.len() < window || window >= MAX_WINDOW {
            return Ok(None);
        }

        examined = merges.len();
        window = (window + WINDOW_STEP).min(MAX_WINDOW);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Oid;
    use chrono::{Duration, TimeZone};
    use std::cell::RefCell;

    /// In-memory history of merge commits, newest first.
    struct FakeHistory {
        merges: Vec<CommitSummary>,
        windows: RefCell<Vec<usize>>,
    }

    impl FakeHistory {
        /// `count` merges one hour apart, the newest at `newest`.
        fn hourly(count: usize, newest: DateTime<Utc>) -> Self {
            let merges = (0..count)
                .map(|i| CommitSummary {
                    oid: Oid::new(format!("{:040x}", i + 1)).unwrap(),
                    committed_at: newest - Duration::hours(i as i64),
                    parent_count: 2,
                })
                .collect();
            Self {
                merges,
                windows: RefCell::new(Vec::new()),
            }
        }

        fn windows(&self) -> Vec<usize> {
            self.windows.borrow().clone()
        }
    }

    impl RepoQuery for FakeHistory {
        fn merge_commits(
            &self,
            _refname: &str,
            max_count: usize,
        ) -> Result<Vec<CommitSummary>, GitError> {
            self.windows.borrow_mut().push(max_count);
            Ok(self.merges.iter().take(max_count).cloned().collect())
        }

        fn resolve_commit(&self, _token: &str) -> Result<Option<Oid>, GitError> {
            Ok(None)
        }

        fn tag_exists(&self, _name: &str) -> Result<bool, GitError> {
            Ok(false)
        }

        fn branch_exists(&self, _name: &str) -> Result<bool, GitError> {
            Ok(false)
        }
    }

    fn newest() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn finds_match_in_first_window() {
        let history = FakeHistory::hourly(200, newest());
        // merges at newest, -1h, -2h, ...; threshold between -2h and -3h
        let threshold = newest() - Duration::minutes(150);

        let found = find_latest_merge_before(&history, "main", threshold)
            .unwrap()
            .unwrap();

        assert_eq!(found.committed_at, newest() - Duration::hours(3));
        assert_eq!(history.windows(), vec![50]);
    }

    #[test]
    fn widens_until_match() {
        let history = FakeHistory::hourly(400, newest());
        let threshold = newest() - Duration::minutes(120 * 60 + 30);

        let found = find_latest_merge_before(&history, "main", threshold)
            .unwrap()
            .unwrap();

        assert_eq!(found.committed_at, newest() - Duration::hours(121));
        assert_eq!(history.windows(), vec![50, 100, 150]);
    }

    #[test]
    fn strictly_before_threshold() {
        let history = FakeHistory::hourly(10, newest());
        let threshold = newest() - Duration::hours(4);

        let found = find_latest_merge_before(&history, "main", threshold)
            .unwrap()
            .unwrap();

        assert_eq!(found.committed_at, newest() - Duration::hours(5));
    }

    #[test]
    fn short_history_stops_early() {
        let history = FakeHistory::hourly(30, newest());
        let threshold = newest() - Duration::days(365);

        assert!(find_latest_merge_before(&history, "main", threshold)
            .unwrap()
            .is_none());
        assert_eq!(history.windows(), vec![50]);
    }

    #[test]
    fn stops_at_ceiling() {
        let history = FakeHistory::hourly(MAX_WINDOW + 100, newest());
        let threshold = newest() - Duration::days(3650);

        assert!(find_latest_merge_before(&history, "main", threshold)
            .unwrap()
            .is_none());

        let windows = history.windows();
        assert_eq!(windows.len(), MAX_WINDOW / WINDOW_STEP);
        assert_eq!(windows.last(), Some(&MAX_WINDOW));
    }

    #[test]
    fn empty_history_is_none() {
        let history = FakeHistory::hourly(0, newest());
        assert!(find_latest_merge_before(&history, "main", newest())
            .unwrap()
            .is_none());
    }
}
