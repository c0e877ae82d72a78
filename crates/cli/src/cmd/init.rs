//! Initialize a directory as a backup source

use anyhow::{Context, Result};
use backup_engine::context;
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub fn run(
    path: Option<PathBuf>,
    store: Option<PathBuf>,
    project: Option<String>,
) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from("."));
    let store = store.context("store path required: backup init --store <path>")?;

    let project = match project {
        Some(project) => project,
        None => {
            // Default the project name to the directory's own name
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                std::env::current_dir()?.join(&path)
            };
            absolute
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("cannot derive a project name; pass --project")?
        }
    };

    let root = context::init_source(&path, &store.to_string_lossy(), &project)?;

    println!(
        "{} Initialized backup source at {} (project: {})",
        "✓".green(),
        root.display(),
        project.cyan()
    );
    Ok(())
}
