//! Shared fixtures for integration tests.
//!
//! Repositories are set up with the `git` CLI so the code under test never
//! builds its own fixtures. Remotes are bare repositories reached by local
//! path.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use gitmover::core::types::RepoId;
use gitmover::sync::RepositoryHandle;

/// Run a git command in `dir`, returning trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    git_with_env(dir, args, &[])
}

/// Run a git command with author and committer dates pinned to `date`.
pub fn git_dated(dir: &Path, args: &[&str], date: &str) -> String {
    git_with_env(
        dir,
        args,
        &[("GIT_AUTHOR_DATE", date), ("GIT_COMMITTER_DATE", date)],
    )
}

fn git_with_env(dir: &Path, args: &[&str], env: &[(&str, &str)]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .envs(env.iter().copied())
        .output()
        .expect("git command failed");

    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// Configure identity and disable signing so commits never prompt.
fn configure(dir: &Path) {
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "user.name", "Test User"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    git(dir, &["config", "tag.gpgsign", "false"]);
}

/// Create an empty bare repository whose HEAD is `main`.
pub fn bare_repo(path: &Path) {
    fs::create_dir_all(path).unwrap();
    git(path, &["init", "--bare", "-b", "main"]);
}

/// A hosted repository: a bare remote plus the working copy that feeds it.
pub struct Upstream {
    /// Working copy used to author history
    pub work: PathBuf,
    /// Bare repository handles fetch from
    pub bare: PathBuf,
}

impl Upstream {
    /// Create `{base}/remotes/{name}.git` with one commit on `main`.
    pub fn new(base: &Path, name: &str) -> Self {
        let bare = base.join("remotes").join(format!("{name}.git"));
        let work = base.join("upstream").join(name);
        bare_repo(&bare);

        fs::create_dir_all(&work).unwrap();
        git(&work, &["init", "-b", "main"]);
        configure(&work);
        git(&work, &["remote", "add", "origin", bare.to_str().unwrap()]);

        let upstream = Self { work, bare };
        upstream.commit_file("README.md", "# Test Repo\n", "Initial commit");
        upstream.push();
        upstream
    }

    /// URL handles use for `origin`.
    pub fn url(&self) -> String {
        self.bare.display().to_string()
    }

    /// Write a file and commit it, returning the new commit id.
    pub fn commit_file(&self, path: &str, content: &str, message: &str) -> String {
        fs::write(self.work.join(path), content).unwrap();
        git(&self.work, &["add", path]);
        git(&self.work, &["commit", "-m", message]);
        self.head()
    }

    /// Same as [`commit_file`](Self::commit_file) with a fixed commit date.
    pub fn commit_file_at(&self, path: &str, content: &str, message: &str, date: &str) -> String {
        fs::write(self.work.join(path), content).unwrap();
        git(&self.work, &["add", path]);
        git_dated(&self.work, &["commit", "-m", message], date);
        self.head()
    }

    /// Merge `branch` into the current branch with a merge commit at `date`.
    pub fn merge_at(&self, branch: &str, date: &str) -> String {
        git_dated(
            &self.work,
            &["merge", "--no-ff", "-m", &format!("Merge {branch}"), branch],
            date,
        );
        self.head()
    }

    /// Run git in the working copy.
    pub fn git(&self, args: &[&str]) -> String {
        git(&self.work, args)
    }

    /// Current commit of the working copy.
    pub fn head(&self) -> String {
        git(&self.work, &["rev-parse", "HEAD"])
    }

    /// Push every branch and tag to the bare remote.
    pub fn push(&self) {
        git(&self.work, &["push", "--force", "origin", "--all"]);
        git(&self.work, &["push", "--force", "origin", "--tags"]);
    }

    /// Commit a ref resolves to in the bare remote.
    pub fn remote_rev(&self, rev: &str) -> String {
        git(&self.bare, &["rev-parse", rev])
    }
}

/// Handle for `acme/{name}` under `root`, with the default settings.
pub fn handle(root: &Path, name: &str, url: &str) -> RepositoryHandle {
    RepositoryHandle::new(RepoId::new("acme", name), root.join("acme"), url)
}

/// Commit a revision resolves to in a working copy.
pub fn rev(dir: &Path, rev: &str) -> String {
    git(dir, &["rev-parse", rev])
}
