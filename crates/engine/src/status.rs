//! Source-vs-snapshot status classification
//!
//! Compares the tree on disk against the latest snapshot: for each entry,
//! whether the latest snapshot names it and whether its content blob is
//! present in the store decide the classification. Directories whose own
//! listing blob is gone are split on a recursive content check: everything
//! below present means the listing can be regenerated (`E`), gaps below
//! mean genuinely new content (`n`).

use crate::context::BackupContext;
use crate::entry::{scan_source, DirEntry, SourceEntry};
use crate::reader::{SnapshotDir, SnapshotEntry};
use crate::snapshot;
use anyhow::Result;
use backup_core::BlobStore;
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryStatus {
    /// Named in the latest snapshot, content present (`.`)
    Archived,
    /// Named in the latest snapshot, content blob missing (`E`)
    ArchivedContentMissing,
    /// Not in the latest snapshot, content unknown to the store (`N`)
    New,
    /// Content already in the store under another name or snapshot (`n`)
    NewContentKnown,
}

impl EntryStatus {
    pub fn code(&self) -> char {
        match self {
            EntryStatus::Archived => '.',
            EntryStatus::ArchivedContentMissing => 'E',
            EntryStatus::New => 'N',
            EntryStatus::NewContentKnown => 'n',
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            EntryStatus::Archived => "File or directory archived",
            EntryStatus::ArchivedContentMissing => {
                "Archived, the archive content file is missing"
            }
            EntryStatus::New => "New file or directory, needs to be archived",
            EntryStatus::NewContentKnown => {
                "New file or directory, content previously archived"
            }
        }
    }

    pub fn all() -> [EntryStatus; 4] {
        [
            EntryStatus::Archived,
            EntryStatus::ArchivedContentMissing,
            EntryStatus::New,
            EntryStatus::NewContentKnown,
        ]
    }
}

/// One line of status output
pub enum StatusLine {
    Ignored {
        path: String,
        source: String,
        pattern: String,
    },
    Entry {
        status: EntryStatus,
        path: String,
        is_dir: bool,
        /// Blob path shown for `E` entries
        missing_blob: Option<PathBuf>,
    },
}

#[derive(Debug, Default)]
pub struct StatusReport {
    pub files: usize,
    pub directories: usize,
    pub ignored: usize,
    pub counters: BTreeMap<EntryStatus, usize>,
}

/// Classify the tree under the invocation directory against the latest
/// snapshot, streaming lines to `emit`
pub fn status(
    ctx: &mut BackupContext,
    show_ignored: bool,
    emit: &mut dyn FnMut(StatusLine),
) -> Result<(Option<snapshot::SnapshotRoot>, StatusReport)> {
    let latest = snapshot::latest(&ctx.snapshots_dir(), ctx.project())?;

    let source_root = ctx
        .source_root()
        .ok_or_else(|| anyhow::anyhow!("status requires a source directory"))?
        .to_path_buf();
    let start_dir = ctx.start_dir().to_path_buf();

    let current = scan_source(ctx, &start_dir)?;

    // Find the snapshot directory matching the invocation directory
    let snapshot_dir = match &latest {
        Some(root) => {
            let rel = start_dir
                .strip_prefix(&source_root)
                .unwrap_or(&start_dir)
                .to_string_lossy()
                .into_owned();
            match root.top().locate(&ctx.store, &rel)? {
                Some(SnapshotEntry::Directory(dir)) => Some(dir),
                _ => None,
            }
        }
        None => None,
    };

    let mut report = StatusReport::default();
    classify_directory(
        ctx,
        &current,
        snapshot_dir.as_ref(),
        show_ignored,
        emit,
        &mut report,
    )?;
    Ok((latest, report))
}

fn classify_directory(
    ctx: &BackupContext,
    current: &DirEntry,
    snapshot_dir: Option<&SnapshotDir>,
    show_ignored: bool,
    emit: &mut dyn FnMut(StatusLine),
    report: &mut StatusReport,
) -> Result<()> {
    if show_ignored {
        let mut ignored: Vec<_> = current.ignored.iter().collect();
        ignored.sort_by(|a, b| a.name.cmp(&b.name));
        for entry in ignored {
            emit(StatusLine::Ignored {
                path: ctx.display_path(&entry.path),
                source: entry.reason.source.clone(),
                pattern: entry.reason.pattern.clone(),
            });
            report.ignored += 1;
        }
    }

    // A snapshot directory whose listing blob is gone contributes nothing:
    // its children degrade to New / NewContentKnown
    let snapshot_entries: Option<BTreeMap<String, SnapshotEntry>> =
        snapshot_dir.and_then(|dir| match dir.entries(&ctx.store) {
            Ok(entries) => Some(entries),
            Err(e) => {
                tracing::warn!("cannot read snapshot directory {}: {e}", dir.digest);
                None
            }
        });

    // Display order is by name, unlike the digest order of listings
    let mut children: Vec<&SourceEntry> = current.children.iter().collect();
    children.sort_by(|a, b| a.name().cmp(b.name()));

    for child in children {
        let in_latest = snapshot_entries
            .as_ref()
            .map(|entries| entries.contains_key(child.name()))
            .unwrap_or(false);
        let content_exists = ctx.store.contains(child.digest());

        let dir_entry = match child {
            SourceEntry::Directory(d) => Some(d),
            _ => None,
        };

        let status = if in_latest {
            if content_exists {
                EntryStatus::Archived
            } else if let Some(dir) = dir_entry {
                if all_content_saved(dir, &ctx.store) {
                    EntryStatus::ArchivedContentMissing
                } else {
                    EntryStatus::NewContentKnown
                }
            } else {
                EntryStatus::ArchivedContentMissing
            }
        } else if content_exists {
            EntryStatus::NewContentKnown
        } else {
            EntryStatus::New
        };

        *report.counters.entry(status).or_default() += 1;

        let missing_blob = (status == EntryStatus::ArchivedContentMissing)
            .then(|| ctx.store.blob_path(child.digest()));

        if let Some(dir) = dir_entry {
            report.directories += 1;
            emit(StatusLine::Entry {
                status,
                path: format!("{}/", ctx.display_path(&dir.path)),
                is_dir: true,
                missing_blob,
            });

            let sub_snapshot = match (&snapshot_entries, in_latest) {
                (Some(entries), true) => match entries.get(child.name()) {
                    Some(SnapshotEntry::Directory(d)) => Some(d.clone()),
                    _ => None,
                },
                _ => None,
            };
            classify_directory(ctx, dir, sub_snapshot.as_ref(), show_ignored, emit, report)?;
        } else {
            report.files += 1;
            let path = match child {
                SourceEntry::File(f) => ctx.display_path(&f.path),
                SourceEntry::Link(l) => ctx.display_path(&l.path),
                SourceEntry::Directory(_) => unreachable!(),
            };
            emit(StatusLine::Entry {
                status,
                path,
                is_dir: false,
                missing_blob,
            });
        }
    }
    Ok(())
}

/// Whether every descendant's content blob is present in the store
fn all_content_saved(dir: &DirEntry, store: &BlobStore) -> bool {
    for child in &dir.children {
        if !store.contains(child.digest()) {
            return false;
        }
        if let SourceEntry::Directory(sub) = child {
            if !all_content_saved(sub, store) {
                return false;
            }
        }
    }
    true
}

/// A project's most recent snapshot time, for headless listings
pub struct ProjectStatus {
    pub name: String,
    pub last_backup: DateTime<Local>,
}

/// Per-project last-backup times, newest first
pub fn project_statuses(ctx: &BackupContext) -> Result<Vec<ProjectStatus>> {
    let snapshots_dir = ctx.snapshots_dir();
    let mut statuses = Vec::new();

    for project in snapshot::list_projects(&snapshots_dir)? {
        let roots = snapshot::project_roots(&snapshots_dir, Some(&project))?;
        if let Some(latest) = roots.last() {
            statuses.push(ProjectStatus {
                name: project,
                last_backup: latest.time,
            });
        }
    }

    statuses.sort_by(|a, b| b.last_backup.cmp(&a.last_backup));
    Ok(statuses)
}
