//! Integration tests for the Git interface.
//!
//! These tests use real git repositories created via tempfile to verify
//! that the Git interface works correctly with actual git operations.

mod support;

use std::fs;

use tempfile::TempDir;

use gitmover::core::types::{BranchName, Oid};
use gitmover::git::{
    ConflictKind, Credentials, Git, GitError, Identity, MergeResult, ProgressMultiplexer,
    RepoQuery,
};
use support::{bare_repo, git, rev, Upstream};

fn open(upstream: &Upstream) -> Git {
    Git::open(&upstream.work).expect("failed to open test repo")
}

// =============================================================================
// Repository Opening Tests
// =============================================================================

#[test]
fn open_valid_repository() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    assert!(Git::open(&upstream.work).is_ok());
}

#[test]
fn open_does_not_search_parents() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    let subdir = upstream.work.join("subdir");
    fs::create_dir(&subdir).unwrap();

    assert!(matches!(
        Git::open(&subdir),
        Err(GitError::NotARepo { path }) if path == subdir
    ));
}

#[test]
fn open_non_repository_fails() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Git::open(dir.path()),
        Err(GitError::NotARepo { .. })
    ));
}

#[test]
fn open_bare_repository_fails() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    assert!(matches!(Git::open(&upstream.bare), Err(GitError::BareRepo)));
}

#[test]
fn init_creates_directories() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("acme/api");
    let git = Git::init(&path).unwrap();

    assert!(path.join(".git").is_dir());
    assert_eq!(git.try_head_oid().unwrap(), None);
    assert_eq!(git.current_branch().unwrap(), None);
}

// =============================================================================
// HEAD and refs
// =============================================================================

#[test]
fn head_matches_git() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    let git = open(&upstream);

    assert_eq!(git.head_oid().unwrap().as_str(), upstream.head());
    assert_eq!(git.current_branch().unwrap().unwrap().as_str(), "main");
    assert!(!git.is_head_detached().unwrap());
}

#[test]
fn head_commit_time_is_committer_time() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    upstream.commit_file_at("a.txt", "a", "dated", "2021-06-01 12:00:00 +0000");

    let git = open(&upstream);
    assert_eq!(
        git.head_commit_time().unwrap().to_rfc3339(),
        "2021-06-01T12:00:00+00:00"
    );
}

#[test]
fn tags_pointing_at_head() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    upstream.git(&["tag", "v1.0.0"]);
    upstream.git(&["tag", "-a", "release", "-m", "annotated"]);
    upstream.commit_file("a.txt", "a", "after tags");

    let git = open(&upstream);
    let first = Oid::new(rev(&upstream.work, "HEAD~1")).unwrap();
    assert_eq!(
        git.tags_pointing_at(&first).unwrap(),
        vec!["release".to_string(), "v1.0.0".to_string()]
    );
    assert!(!git.head_is_tagged("v1.0.0").unwrap());
    assert_eq!(git.list_tags().unwrap(), vec!["release", "v1.0.0"]);
}

#[test]
fn try_resolve_missing_ref_is_none() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    let git = open(&upstream);

    assert!(git.try_resolve_ref("refs/heads/main").unwrap().is_some());
    assert!(git.try_resolve_ref("refs/heads/absent").unwrap().is_none());
}

#[test]
fn dirty_worktree_detected() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    let git = open(&upstream);

    assert!(!git.is_dirty().unwrap());
    fs::write(upstream.work.join("untracked.txt"), "x").unwrap();
    assert!(!git.is_dirty().unwrap());
    fs::write(upstream.work.join("README.md"), "changed").unwrap();
    assert!(git.is_dirty().unwrap());
}

// =============================================================================
// Checkout and branches
// =============================================================================

#[test]
fn create_branch_does_not_move_head() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    let git = open(&upstream);
    let head = git.head_oid().unwrap();

    git.create_branch(&BranchName::new("feature").unwrap(), &head)
        .unwrap();

    let branches: Vec<String> = git
        .list_branches()
        .unwrap()
        .iter()
        .map(|b| b.to_string())
        .collect();
    assert_eq!(branches, vec!["feature", "main"]);
    assert_eq!(git.current_branch().unwrap().unwrap().as_str(), "main");
}

#[test]
fn checkout_tag_detaches() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    upstream.git(&["tag", "v1.0.0"]);
    upstream.commit_file("a.txt", "a", "second");

    let git = open(&upstream);
    git.checkout("v1.0.0", &mut ProgressMultiplexer::silent())
        .unwrap();

    assert!(git.is_head_detached().unwrap());
    assert!(!upstream.work.join("a.txt").exists());
    assert!(git.head_is_tagged("v1.0.0").unwrap());
}

#[test]
fn checkout_remote_branch_creates_tracking_branch() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    upstream.git(&["checkout", "-b", "feature"]);
    let feature = upstream.commit_file("f.txt", "f", "feature work");
    upstream.push();

    let clone = temp.path().join("clone");
    git(
        temp.path(),
        &["clone", upstream.bare.to_str().unwrap(), "clone"],
    );

    let repo = Git::open(&clone).unwrap();
    repo.checkout("feature", &mut ProgressMultiplexer::silent())
        .unwrap();

    assert_eq!(repo.current_branch().unwrap().unwrap().as_str(), "feature");
    assert_eq!(repo.head_oid().unwrap().as_str(), feature);
    assert_eq!(
        git(&clone, &["rev-parse", "--abbrev-ref", "feature@{upstream}"]),
        "origin/feature"
    );
    assert!(clone.join("f.txt").exists());
}

#[test]
fn checkout_unknown_name_fails() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    let git = open(&upstream);

    assert!(git
        .checkout("no-such-thing", &mut ProgressMultiplexer::silent())
        .is_err());
    assert_eq!(git.current_branch().unwrap().unwrap().as_str(), "main");
}

// =============================================================================
// Merge
// =============================================================================

fn diverged(temp: &TempDir, same_file: bool) -> Upstream {
    let upstream = Upstream::new(temp.path(), "api");
    upstream.commit_file("a.txt", "base\n", "base");
    upstream.git(&["checkout", "-b", "feature"]);
    upstream.commit_file("a.txt", "feature\n", "feature edit");
    upstream.git(&["checkout", "main"]);
    if same_file {
        upstream.commit_file("a.txt", "main\n", "main edit");
    } else {
        upstream.commit_file("b.txt", "main\n", "main edit");
    }
    upstream
}

#[test]
fn merge_fast_forward() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    upstream.git(&["checkout", "-b", "feature"]);
    let tip = upstream.commit_file("a.txt", "a", "ahead");
    upstream.git(&["checkout", "main"]);

    let git = open(&upstream);
    let result = git.merge("feature", &Identity::default()).unwrap();

    assert_eq!(result, MergeResult::FastForward(Oid::new(tip.clone()).unwrap()));
    assert_eq!(upstream.head(), tip);
    assert!(upstream.work.join("a.txt").exists());
}

#[test]
fn merge_up_to_date() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    upstream.git(&["branch", "feature"]);

    let git = open(&upstream);
    assert_eq!(
        git.merge("feature", &Identity::default()).unwrap(),
        MergeResult::UpToDate
    );
}

#[test]
fn merge_clean_creates_commit() {
    let temp = TempDir::new().unwrap();
    let upstream = diverged(&temp, false);
    let git = open(&upstream);

    let result = git.merge("feature", &Identity::default()).unwrap();

    let MergeResult::Merged(oid) = result else {
        panic!("expected a merge commit, got {result:?}");
    };
    assert_eq!(oid.as_str(), upstream.head());
    let parents = upstream.git(&["rev-list", "--parents", "-n", "1", "HEAD"]);
    assert_eq!(parents.split(' ').count(), 3);
    assert_eq!(upstream.git(&["log", "-1", "--format=%an"]), "Test User");
    assert!(!git.has_conflicts().unwrap());
}

#[test]
fn merge_conflict_reports_paths() {
    let temp = TempDir::new().unwrap();
    let upstream = diverged(&temp, true);
    let git = open(&upstream);
    let before = upstream.head();

    let result = git.merge("feature", &Identity::default()).unwrap();

    let MergeResult::Conflicted(conflicts) = result else {
        panic!("expected conflicts, got {result:?}");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].path, "a.txt");
    assert_eq!(conflicts[0].kind, ConflictKind::Content);
    assert_eq!(
        conflicts[0].to_string(),
        "CONFLICT (content): Merge conflict in a.txt"
    );
    assert!(git.has_conflicts().unwrap());
    assert_eq!(upstream.head(), before);
    let contents = fs::read_to_string(upstream.work.join("a.txt")).unwrap();
    assert!(contents.contains("<<<<<<<"));
}

// =============================================================================
// History queries
// =============================================================================

#[test]
fn merge_commits_newest_first() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    let mut merges = Vec::new();
    for (i, day) in ["2020-01-02", "2020-01-03"].iter().enumerate() {
        let branch = format!("topic-{i}");
        upstream.git(&["checkout", "-b", &branch]);
        upstream.commit_file_at(&format!("{i}.txt"), "x", "topic", &format!("{day} 08:00:00 +0000"));
        upstream.git(&["checkout", "main"]);
        merges.push(upstream.merge_at(&branch, &format!("{day} 10:00:00 +0000")));
    }

    let git = open(&upstream);
    let found = git.merge_commits("main", 10).unwrap();
    let oids: Vec<&str> = found.iter().map(|c| c.oid.as_str()).collect();
    assert_eq!(oids, vec![merges[1].as_str(), merges[0].as_str()]);
    assert!(found.iter().all(|c| c.is_merge()));

    assert_eq!(git.merge_commits("main", 1).unwrap().len(), 1);
}

#[test]
fn resolve_commit_accepts_refs_and_hashes() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    let head = upstream.head();
    upstream.git(&["tag", "v1.2.3"]);

    let git = open(&upstream);
    assert_eq!(
        git.resolve_commit(&head[..10]).unwrap().unwrap().as_str(),
        head
    );
    assert_eq!(git.resolve_commit("v1.2.3").unwrap().unwrap().as_str(), head);
    assert_eq!(git.resolve_commit("1.2.3").unwrap(), None);
    assert!(git.tag_exists("v1.2.3").unwrap());
    assert!(git.branch_exists("main").unwrap());
    assert!(!git.branch_exists("v1.2.3").unwrap());
}

// =============================================================================
// Remotes and transfers
// =============================================================================

#[test]
fn remote_lifecycle() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    let git = open(&upstream);

    git.create_remote("mirror", "/srv/mirror.git").unwrap();
    assert_eq!(
        git.remote_url("mirror").unwrap().as_deref(),
        Some("/srv/mirror.git")
    );
    let mut names = git.remote_names().unwrap();
    names.sort();
    assert_eq!(names, vec!["mirror", "origin"]);

    git.delete_remote("mirror").unwrap();
    assert_eq!(git.remote_url("mirror").unwrap(), None);
    assert!(git.delete_remote("mirror").is_err());
}

#[test]
fn fetch_and_push_between_bare_repositories() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    upstream.git(&["tag", "v1.0.0"]);
    upstream.push();

    let copy = Git::init(&temp.path().join("copy")).unwrap();
    copy.create_remote("origin", &upstream.url()).unwrap();
    copy.fetch(
        "origin",
        &[],
        None,
        &Credentials::default(),
        &mut ProgressMultiplexer::silent(),
    )
    .unwrap();

    assert_eq!(copy.list_remote_branches("origin").unwrap(), vec!["main"]);
    assert_eq!(copy.list_tags().unwrap(), vec!["v1.0.0"]);

    let mirror = temp.path().join("mirror.git");
    bare_repo(&mirror);
    copy.create_remote("mirror", mirror.to_str().unwrap()).unwrap();
    copy.push(
        "mirror",
        &[
            "+refs/remotes/origin/main:refs/heads/main".to_string(),
            "+refs/tags/v1.0.0:refs/tags/v1.0.0".to_string(),
        ],
        &Credentials::default(),
        &mut ProgressMultiplexer::silent(),
    )
    .unwrap();

    assert_eq!(git(&mirror, &["rev-parse", "main"]), upstream.head());
    assert_eq!(git(&mirror, &["rev-parse", "v1.0.0"]), upstream.head());
}

#[test]
fn fetch_from_unknown_remote_fails() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    let git = open(&upstream);

    let result = git.fetch(
        "nowhere",
        &[],
        None,
        &Credentials::default(),
        &mut ProgressMultiplexer::silent(),
    );
    assert!(matches!(result, Err(GitError::RemoteNotFound { .. })));
}

#[test]
fn remote_default_branch_reads_remote_head() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(temp.path(), "api");
    let git = open(&upstream);

    assert_eq!(
        git.remote_default_branch("origin", &Credentials::default())
            .unwrap()
            .as_deref(),
        Some("main")
    );
}
