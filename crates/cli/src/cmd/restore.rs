//! Restore a snapshot or a path within one

use anyhow::{Context, Result};
use backup_engine::{snapshot, BackupContext};
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub fn run(
    ctx: BackupContext,
    reference: &str,
    arg1: Option<String>,
    arg2: Option<String>,
) -> Result<()> {
    let root = snapshot::find(&ctx.snapshots_dir(), ctx.project(), reference)?;

    // Source mode: args are <ref> [path] [dest], destination defaults into
    // the current directory. Store mode: a destination is required, so two
    // args mean <ref> <dest>.
    let (path_inside, dest) = if ctx.is_source_mode() {
        (arg1.unwrap_or_default(), arg2)
    } else {
        match (arg1, arg2) {
            (Some(path), Some(dest)) => (path, Some(dest)),
            (Some(dest), None) => (String::new(), Some(dest)),
            (None, _) => anyhow::bail!(
                "destination required when not running from a source directory"
            ),
        }
    };

    // A path typed in a subdirectory of the source is relative to that
    // subdirectory, the way checkout-style tools treat it
    let resolved_path = match ctx.source_root() {
        Some(source_root) if !path_inside.is_empty() => {
            match ctx.start_dir().strip_prefix(source_root) {
                Ok(rel) if rel.as_os_str().is_empty() => path_inside.clone(),
                Ok(rel) => format!("{}/{path_inside}", rel.display()),
                Err(_) => path_inside.clone(),
            }
        }
        _ => path_inside.clone(),
    };

    let entry = root
        .top()
        .locate(&ctx.store, &resolved_path)?
        .with_context(|| {
            format!("path '{resolved_path}' not found in snapshot {}", root.label())
        })?;

    let dest = match dest {
        Some(dest) => PathBuf::from(dest),
        None if path_inside.is_empty() => PathBuf::from("."),
        None => PathBuf::from(entry.name()),
    };

    println!(
        "Restoring {} from {} to {}...",
        if resolved_path.is_empty() {
            "snapshot root"
        } else {
            &resolved_path
        },
        root.label().cyan(),
        dest.display()
    );

    entry.restore(&ctx.store, &dest)?;

    println!("{}", "Restore complete.".green());
    Ok(())
}
