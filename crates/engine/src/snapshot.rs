//! Snapshot heads
//!
//! A head is a small text file under `snapshots/` naming the root directory
//! digest of one snapshot. Heads are grouped by project
//! (`snapshots/<project>/<ts>`); sources without a project name write heads
//! directly under `snapshots/` (legacy layout). Head names are local-time
//! `YYMMDD-HHMMSS` timestamps.

use crate::reader::SnapshotDir;
use anyhow::{Context, Result};
use backup_core::Digest;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const TIMESTAMP_FORMAT: &str = "%y%m%d-%H%M%S";

/// One snapshot: a parsed head file
#[derive(Debug, Clone)]
pub struct SnapshotRoot {
    pub time: DateTime<Local>,
    pub head_path: PathBuf,
    pub digest: Digest,
    label: String,
}

impl SnapshotRoot {
    /// Parse a head file; fails on bad names, unreadable content, empty
    /// content (a malformed head) or an unparsable digest
    pub fn load(snapshots_dir: &Path, head_path: &Path) -> Result<Self> {
        let name = head_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("head path has no file name")?;

        let naive = NaiveDateTime::parse_from_str(&name, TIMESTAMP_FORMAT)
            .with_context(|| format!("head name is not a timestamp: {name}"))?;
        let time = Local
            .from_local_datetime(&naive)
            .earliest()
            .with_context(|| format!("head timestamp not representable in local time: {name}"))?;

        let content = std::fs::read_to_string(head_path)
            .with_context(|| format!("failed to read head {}", head_path.display()))?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            anyhow::bail!("snapshot head file is empty: {}", head_path.display());
        }
        let digest = Digest::from_hex(trimmed)
            .with_context(|| format!("head {} has no valid digest", head_path.display()))?;

        // Heads in a project directory are labelled "project/timestamp"
        let label = match head_path.parent() {
            Some(parent) if parent != snapshots_dir => {
                let project = parent
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("{project}/{name}")
            }
            _ => name,
        };

        Ok(Self {
            time,
            head_path: head_path.to_path_buf(),
            digest,
            label,
        })
    }

    /// Display name: timestamp, prefixed with the project directory
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The snapshot's top-level directory
    pub fn top(&self) -> SnapshotDir {
        SnapshotDir {
            digest: self.digest,
            name: ".".to_string(),
        }
    }
}

/// Result of scanning head files: parsed roots plus the heads that failed
pub struct HeadScan {
    pub roots: Vec<SnapshotRoot>,
    pub malformed: Vec<(PathBuf, String)>,
}

/// Scan head files, scoped to one project when given
///
/// Without a project, legacy heads directly under `snapshots/` and every
/// project directory are scanned.
pub fn scan_heads(snapshots_dir: &Path, project: Option<&str>) -> Result<HeadScan> {
    let mut scan = HeadScan {
        roots: Vec::new(),
        malformed: Vec::new(),
    };

    match project {
        Some(project) => {
            scan_head_dir(snapshots_dir, &snapshots_dir.join(project), &mut scan)?;
        }
        None => {
            let entries = match std::fs::read_dir(snapshots_dir) {
                Ok(rd) => rd,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(scan),
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("failed to read {}", snapshots_dir.display())
                    })
                }
            };
            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    scan_head_dir(snapshots_dir, &entry.path(), &mut scan)?;
                } else {
                    record_head(snapshots_dir, &entry.path(), &mut scan);
                }
            }
        }
    }

    scan.roots.sort_by_key(|r| r.time);
    Ok(scan)
}

fn scan_head_dir(snapshots_dir: &Path, dir: &Path, scan: &mut HeadScan) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", dir.display())),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        record_head(snapshots_dir, &entry.path(), scan);
    }
    Ok(())
}

fn record_head(snapshots_dir: &Path, path: &Path, scan: &mut HeadScan) {
    match SnapshotRoot::load(snapshots_dir, path) {
        Ok(root) => scan.roots.push(root),
        Err(e) => scan.malformed.push((path.to_path_buf(), e.to_string())),
    }
}

/// Snapshots visible in the current project scope, oldest first
pub fn project_roots(snapshots_dir: &Path, project: Option<&str>) -> Result<Vec<SnapshotRoot>> {
    let scan = scan_heads(snapshots_dir, project)?;
    for (path, reason) in &scan.malformed {
        warn!("skipping snapshot head {}: {reason}", path.display());
    }
    Ok(scan.roots)
}

/// Every snapshot in the store, across all projects, oldest first
pub fn all_roots(snapshots_dir: &Path) -> Result<Vec<SnapshotRoot>> {
    project_roots(snapshots_dir, None)
}

/// The most recent snapshot in the current project scope
pub fn latest(snapshots_dir: &Path, project: Option<&str>) -> Result<Option<SnapshotRoot>> {
    Ok(project_roots(snapshots_dir, project)?.into_iter().last())
}

/// Look a snapshot up by reference: a bare timestamp within the current
/// project, or `project/timestamp` from anywhere
pub fn find(snapshots_dir: &Path, project: Option<&str>, name: &str) -> Result<SnapshotRoot> {
    let path = match project {
        Some(project) if !name.contains('/') => snapshots_dir.join(project).join(name),
        _ => snapshots_dir.join(name),
    };
    if !path.exists() {
        anyhow::bail!("snapshot not found: {name}");
    }
    SnapshotRoot::load(snapshots_dir, &path)
}

/// Project directories present under `snapshots/`
pub fn list_projects(snapshots_dir: &Path) -> Result<Vec<String>> {
    let mut projects = Vec::new();
    let entries = match std::fs::read_dir(snapshots_dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(projects),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", snapshots_dir.display()))
        }
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            projects.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    projects.sort();
    Ok(projects)
}

/// Write a new snapshot head for the given root digest
///
/// Head timestamps have one-second resolution; on collision this waits and
/// retries until the clock yields an unused name.
pub fn write_head(
    snapshots_dir: &Path,
    project: Option<&str>,
    digest: &Digest,
) -> Result<String> {
    let head_dir = match project {
        Some(project) => snapshots_dir.join(project),
        None => snapshots_dir.to_path_buf(),
    };
    std::fs::create_dir_all(&head_dir)
        .with_context(|| format!("failed to create snapshot dir {}", head_dir.display()))?;

    loop {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let head_path = head_dir.join(&timestamp);
        if head_path.exists() {
            std::thread::sleep(std::time::Duration::from_millis(100));
            continue;
        }
        std::fs::write(&head_path, format!("{digest}\n"))
            .with_context(|| format!("failed to write head {}", head_path.display()))?;
        return Ok(timestamp);
    }
}

/// Result of taking a snapshot
pub struct CreateOutcome {
    pub root_digest: Digest,
    /// Head timestamp; absent on dry runs, which write nothing
    pub timestamp: Option<String>,
}

/// Take a snapshot of the source tree: scan, save blobs bottom-up, commit
/// the head, then prune and persist the hash cache
///
/// Any leftover `.partial` files from an interrupted run are swept first.
pub fn create(ctx: &mut crate::context::BackupContext) -> Result<CreateOutcome> {
    let source = ctx
        .source_root()
        .context("backup requires a source directory")?
        .to_path_buf();

    let swept = ctx.store.cleanup_partials()?;
    if swept > 0 {
        warn!("removed {swept} partial blob(s) left by an interrupted backup");
    }

    let root = crate::entry::scan_source(ctx, &source)?;
    root.save(ctx)?;

    if ctx.dry_run {
        return Ok(CreateOutcome {
            root_digest: root.digest,
            timestamp: None,
        });
    }

    let timestamp = write_head(&ctx.snapshots_dir(), ctx.project(), &root.digest)?;

    if let Some(cache) = ctx.hash_cache.as_mut() {
        cache.prune();
        if let Err(e) = cache.save() {
            warn!("failed to save hash cache: {e}");
        }
    }

    Ok(CreateOutcome {
        root_digest: root.digest,
        timestamp: Some(timestamp),
    })
}
