//! List snapshots

use anyhow::Result;
use backup_engine::{snapshot, BackupContext};
use owo_colors::OwoColorize;

pub fn run(ctx: BackupContext) -> Result<()> {
    let roots = snapshot::project_roots(&ctx.snapshots_dir(), ctx.project())?;

    for root in &roots {
        println!("{} {}", root.label().cyan(), root.digest);
    }
    println!("{} snapshots found", roots.len());
    Ok(())
}
