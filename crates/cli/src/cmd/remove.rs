//! Remove snapshots, then prune the blobs they alone referenced

use crate::util;
use anyhow::Result;
use backup_engine::{reachability, snapshot, BackupContext};
use owo_colors::OwoColorize;

pub fn run(ctx: BackupContext, references: &[String], dry_run: bool) -> Result<()> {
    let snapshots_dir = ctx.snapshots_dir();

    for reference in references {
        let root = match snapshot::find(&snapshots_dir, ctx.project(), reference) {
            Ok(root) => root,
            Err(e) => {
                eprintln!("{} snapshot '{reference}': {e:#}", "error:".red());
                continue;
            }
        };

        if dry_run {
            println!("[dry-run] Would remove snapshot {}", root.label().yellow());
            continue;
        }

        println!("Removing snapshot {}...", root.label().cyan());
        if let Err(e) = std::fs::remove_file(&root.head_path) {
            eprintln!(
                "{} failed to remove snapshot file {}: {e}",
                "error:".red(),
                root.head_path.display()
            );
        }
    }

    if dry_run {
        // The heads are still in place, so a prune dry-run would report
        // nothing; just note what would happen
        println!("[dry-run] Would prune unreferenced data blobs");
        return Ok(());
    }

    println!("Removal complete. Pruning unreferenced data blobs...");
    let stats = reachability::prune(&ctx, false)?;
    println!(
        "Pruned {} unreferenced blobs, reclaimed {}",
        stats.blobs_removed.to_string().green(),
        util::format_size(stats.bytes_removed).green()
    );
    Ok(())
}
