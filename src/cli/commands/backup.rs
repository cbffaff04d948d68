//! backup command - Fetch every repository and check out its default branch

use std::path::Path;

use anyhow::Result;

use super::{report, Context};
use crate::batch::{self, workflows};

/// Fetch every repository of the manifest into the working root.
pub fn backup(ctx: &Context, manifest: &Path) -> Result<()> {
    let items = ctx.work_items(manifest)?;
    let settings = ctx.handle_settings()?;

    let report = batch::run(&ctx.root, &items, |item| {
        let mut handle = settings.handle_for(item);
        workflows::backup(&mut handle, &item.url)
    });

    report::finish(ctx, "backup", &report, |result| match &result.head {
        Some(head) => format!("{} branches, on {}", result.branches.len(), head),
        None => "origin has no branches".to_string(),
    })
}
