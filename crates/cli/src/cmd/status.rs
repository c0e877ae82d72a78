//! Compare the source tree against the latest snapshot

use crate::util;
use anyhow::Result;
use backup_engine::status::{self, EntryStatus, StatusLine};
use backup_engine::{snapshot, BackupContext};
use owo_colors::OwoColorize;

pub fn run(mut ctx: BackupContext, show_ignored: bool) -> Result<()> {
    let latest = snapshot::latest(&ctx.snapshots_dir(), ctx.project())?;
    match &latest {
        Some(root) => println!("Last backup was at {}", root.label().cyan()),
        None => println!("No previous backups"),
    }
    println!();

    if !ctx.is_source_mode() {
        return run_headless(&ctx);
    }

    let (_, report) = status::status(&mut ctx, show_ignored, &mut print_line)?;

    println!();
    println!("\t{}\tFiles", report.files);
    println!("\t{}\tDirectories", report.directories);
    for status in EntryStatus::all() {
        if let Some(count) = report.counters.get(&status) {
            println!("{}\t{count}\t{}", status.code(), status.description());
        }
    }
    if show_ignored {
        println!("I\t{}\tIgnored files", report.ignored);
    }

    Ok(())
}

fn print_line(line: StatusLine) {
    match line {
        StatusLine::Ignored {
            path,
            source,
            pattern,
        } => {
            println!(
                "I {path}{}",
                format!(" (Ignored by {source}: {pattern})").dimmed()
            );
        }
        StatusLine::Entry {
            status,
            path,
            missing_blob,
            ..
        } => {
            let extra = match missing_blob {
                Some(blob) => format!(" #{}", blob.display()),
                None => String::new(),
            };
            println!("{} {path}{extra}", status.code());
        }
    }
}

/// Store mode: no source tree to classify, list the projects instead
fn run_headless(ctx: &BackupContext) -> Result<()> {
    println!("Source directory not specified (store mode). Listing all projects:");
    println!();

    let statuses = status::project_statuses(ctx)?;
    if statuses.is_empty() {
        println!("No backups found.");
        return Ok(());
    }

    let width = statuses.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for project in statuses {
        println!(
            "{:width$}  {}  {}",
            project.name,
            project.last_backup.format("%Y-%m-%d %H:%M:%S"),
            util::time_ago(project.last_backup).dimmed()
        );
    }
    Ok(())
}
