//! Remove unreferenced blobs from the store

use crate::util;
use anyhow::Result;
use backup_engine::{reachability, BackupContext};
use owo_colors::OwoColorize;

pub fn run(ctx: BackupContext, dry_run: bool) -> Result<()> {
    let stats = reachability::prune(&ctx, dry_run)?;

    if dry_run {
        println!(
            "[dry-run] Found {} unreferenced blobs, would reclaim {}",
            stats.blobs_removed.to_string().yellow(),
            util::format_size(stats.bytes_removed).yellow()
        );
    } else {
        println!(
            "Pruned {} unreferenced blobs, reclaimed {}",
            stats.blobs_removed.to_string().green(),
            util::format_size(stats.bytes_removed).green()
        );
    }
    Ok(())
}
