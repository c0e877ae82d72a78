//! Create a new snapshot

use crate::util;
use anyhow::Result;
use backup_engine::{snapshot, BackupContext};
use owo_colors::OwoColorize;

pub fn run(mut ctx: BackupContext, dry_run: bool) -> Result<()> {
    if !ctx.is_source_mode() {
        anyhow::bail!(
            "run 'backup' from a source directory; {} is a store, not a source",
            ctx.store_root().display()
        );
    }
    ctx.dry_run = dry_run;

    println!("{}", "Starting backup...".bold());
    if dry_run {
        println!("{}", "Running in dry-run mode".yellow());
    }

    let outcome = snapshot::create(&mut ctx)?;

    match &outcome.timestamp {
        Some(timestamp) => {
            let mut msg = format!("Backup completed successfully. Head: {timestamp}");
            if let Some(project) = ctx.project() {
                msg.push_str(&format!(" (project: {project})"));
            }
            println!("{}", msg.green());
        }
        None => {
            println!("{}", "[dry-run] No snapshot head written".yellow());
        }
    }

    println!();
    println!("{}", "Backup summary:".bold());
    println!(
        "  Files:       {} total, {} archived",
        ctx.stats.files_total,
        ctx.stats.files_archived.to_string().cyan()
    );
    println!(
        "  Directories: {} total, {} archived",
        ctx.stats.dirs_total,
        ctx.stats.dirs_archived.to_string().cyan()
    );
    println!(
        "  Bytes:       {} archived",
        util::format_size(ctx.stats.bytes_archived).cyan()
    );

    Ok(())
}
