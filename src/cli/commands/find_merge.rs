//! find-merge command - Report the latest merge commit before a point in time

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::{report, Context};
use crate::batch::{self, workflows};

/// Report the latest merge on `refname` before `before` in every local copy.
pub fn find_merge(
    ctx: &Context,
    manifest: &Path,
    refname: &str,
    before: DateTime<Utc>,
) -> Result<()> {
    let items = ctx.work_items(manifest)?;
    let settings = ctx.handle_settings()?;

    let report = batch::run(&ctx.root, &items, |item| {
        let mut handle = settings.handle_for(item);
        workflows::find_merge(&mut handle, refname, before)
    });

    report::finish(ctx, "find-merge", &report, |found| match found {
        Some(commit) => format!("{} ({})", commit.oid, commit.committed_at.to_rfc3339()),
        None => "no merge found".to_string(),
    })
}
