//! migrate command - Build a migration branch, then optionally merge and push

use std::path::Path;

use anyhow::Result;

use super::{report, Context};
use crate::batch::{
    self,
    workflows::{self, MigrateOptions, MigrateResult},
};
use crate::sync::MergeOutcome;

/// Build `options.branch` from `options.base` in every repository.
pub fn migrate(ctx: &Context, manifest: &Path, options: &MigrateOptions) -> Result<()> {
    let items = ctx.work_items(manifest)?;
    let settings = ctx.handle_settings()?;

    let report = batch::run(&ctx.root, &items, |item| {
        let mut handle = settings.handle_for(item);
        workflows::migrate(&mut handle, &item.url, options)
    });

    report::finish(ctx, "migrate", &report, describe)
}

fn describe(result: &MigrateResult) -> String {
    let mut line = format!("on {}", result.head);
    match &result.merge {
        Some(MergeOutcome::Clean { .. }) => line.push_str(", merged"),
        Some(MergeOutcome::Conflicted { conflicts }) => {
            line.push_str(&format!(", merge conflicts in {} paths", conflicts.len()))
        }
        Some(MergeOutcome::Failed { message }) => {
            line.push_str(&format!(", merge failed: {message}"))
        }
        None => {}
    }
    if let Some(remote) = &result.pushed_to {
        line.push_str(&format!(", pushed to {remote}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BranchName;
    use crate::sync::HeadPosition;

    fn head() -> HeadPosition {
        HeadPosition::Branch(BranchName::new("release-branch").unwrap())
    }

    #[test]
    fn describes_conflict_without_push() {
        let result = MigrateResult {
            head: head(),
            merge: Some(MergeOutcome::Conflicted {
                conflicts: vec!["CONFLICT (content): Merge conflict in a.txt".to_string()],
            }),
            pushed_to: None,
        };
        assert_eq!(
            describe(&result),
            "on branch release-branch, merge conflicts in 1 paths"
        );
    }

    #[test]
    fn describes_plain_branch_and_push() {
        let result = MigrateResult {
            head: head(),
            merge: None,
            pushed_to: Some("origin".to_string()),
        };
        assert_eq!(
            describe(&result),
            "on branch release-branch, pushed to origin"
        );
    }
}
