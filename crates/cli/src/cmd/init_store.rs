//! Initialize a new backup store

use anyhow::Result;
use backup_engine::context;
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub fn run(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from("."));
    let root = context::init_store(&path)?;

    println!(
        "{} Initialized backup store at {}",
        "✓".green(),
        root.display()
    );
    Ok(())
}
