//! Check the integrity of the backup store

use anyhow::Result;
use backup_engine::{check, BackupContext};
use owo_colors::OwoColorize;

pub fn run(ctx: BackupContext, deep: bool) -> Result<()> {
    println!("Checking store integrity (deep={deep})...");

    let issues = check::verify(&ctx, deep)?;
    if issues.is_empty() {
        println!("{}", "Store integrity check passed.".green());
        return Ok(());
    }

    println!("{}", "Integrity check failed with errors:".red().bold());
    for issue in &issues {
        println!(" - {issue}");
    }
    anyhow::bail!("store integrity check failed ({} errors)", issues.len());
}
