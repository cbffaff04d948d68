//! release command - Replace each working copy with a snapshot of a tag

use std::path::Path;

use anyhow::Result;

use super::{report, Context};
use crate::batch::{self, workflows};

/// Snapshot `tag` in every repository.
pub fn release(ctx: &Context, manifest: &Path, tag: &str) -> Result<()> {
    let items = ctx.work_items(manifest)?;
    let settings = ctx.handle_settings()?;

    let report = batch::run(&ctx.root, &items, |item| {
        let mut handle = settings.handle_for(item);
        workflows::release(&mut handle, tag)
    });

    report::finish(ctx, "release", &report, |head| format!("on {head}"))
}
