//! mirror command - Replicate all branches and tags onto another host

use std::path::Path;

use anyhow::Result;

use super::{report, Context};
use crate::batch::{self, workflows};

/// Push every branch and tag of each repository to the URL `to` renders to.
pub fn mirror(ctx: &Context, manifest: &Path, to: &str) -> Result<()> {
    let items = ctx.work_items(manifest)?;
    let settings = ctx.handle_settings()?;

    let report = batch::run(&ctx.root, &items, |item| {
        let mirror_url = ctx.config.render_url(to, &item.id.org, &item.id.repo);
        let mut handle = settings.handle_for(item);
        workflows::mirror(&mut handle, &item.url, &mirror_url)
    });

    report::finish(ctx, "mirror", &report, |result| {
        format!(
            "mirrored {} branches and {} tags",
            result.branches.len(),
            result.tags
        )
    })
}
