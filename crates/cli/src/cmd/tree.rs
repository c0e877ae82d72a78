//! Recursively list the contents of a snapshot

use anyhow::Result;
use backup_core::BlobStore;
use backup_engine::{snapshot, BackupContext, SnapshotEntry};
use owo_colors::OwoColorize;

pub fn run(ctx: BackupContext, reference: Option<&str>) -> Result<()> {
    let snapshots_dir = ctx.snapshots_dir();
    let root = match reference {
        Some(name) => snapshot::find(&snapshots_dir, ctx.project(), name)?,
        None => match snapshot::latest(&snapshots_dir, ctx.project())? {
            Some(root) => root,
            None => {
                println!("No backups found.");
                return Ok(());
            }
        },
    };

    println!("Listing content for backup {}", root.label().cyan());
    print_tree(&ctx.store, &root.top(), "")
}

fn print_tree(
    store: &BlobStore,
    dir: &backup_engine::reader::SnapshotDir,
    prefix: &str,
) -> Result<()> {
    for (name, entry) in dir.entries(store)? {
        let hex = entry.digest().to_hex();
        let short = &hex[..7];
        match &entry {
            SnapshotEntry::Directory(sub) => {
                println!("{prefix}{name}/ {}", format!("({short})").dimmed());
                print_tree(store, sub, &format!("{prefix}  "))?;
            }
            SnapshotEntry::Link(_) => {
                println!("{prefix}{name}@ {}", format!("({short})").dimmed());
            }
            SnapshotEntry::File(_) => {
                println!("{prefix}{name} {}", format!("({short})").dimmed());
            }
        }
    }
    Ok(())
}
