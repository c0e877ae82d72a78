//! Drop stale hash-cache entries

use anyhow::{Context, Result};
use backup_engine::BackupContext;
use owo_colors::OwoColorize;

pub fn run(mut ctx: BackupContext, dry_run: bool) -> Result<()> {
    let cache = ctx
        .hash_cache
        .as_mut()
        .context("prune-cache requires running from a source directory")?;

    if dry_run {
        println!("[dry-run] Checking hash cache...");
    } else {
        println!("Pruning hash cache...");
    }

    let removed = cache.prune();

    if dry_run {
        println!(
            "[dry-run] Would remove {} entries from the hash cache.",
            removed.to_string().yellow()
        );
    } else {
        println!(
            "Removed {} entries from the hash cache.",
            removed.to_string().green()
        );
        if removed > 0 {
            cache.save().context("failed to save hash cache")?;
        }
    }
    Ok(())
}
