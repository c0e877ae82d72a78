//! Reachability over the store graph, and pruning
//!
//! A blob is reachable iff it appears in the transitive closure of any
//! snapshot head in the store, across every project, never scoped to the
//! current one. Pruning from inside one project must not orphan another
//! project's blobs.

use crate::context::BackupContext;
use crate::reader::parse_listing_line;
use crate::snapshot;
use anyhow::{Context, Result};
use backup_core::{BlobStore, Digest};
use std::collections::HashSet;
use std::io::{BufRead, BufReader};

/// Digests reachable from any snapshot head in the store
pub fn reachable_digests(ctx: &BackupContext) -> Result<HashSet<Digest>> {
    let mut reachable = HashSet::new();
    let mut visited_dirs = HashSet::new();

    for root in snapshot::all_roots(&ctx.snapshots_dir())? {
        traverse(&ctx.store, &root.digest, &mut reachable, &mut visited_dirs)?;
    }
    Ok(reachable)
}

/// Mark `digest` and, if its blob parses as a directory listing, everything
/// below it
///
/// The tree is a DAG: shared subtrees are visited once. A missing blob ends
/// the descent; the digest stays marked, its children are unknowable here
/// (check reports the gap).
fn traverse(
    store: &BlobStore,
    digest: &Digest,
    reachable: &mut HashSet<Digest>,
    visited_dirs: &mut HashSet<Digest>,
) -> Result<()> {
    reachable.insert(*digest);
    if !visited_dirs.insert(*digest) {
        return Ok(());
    }

    let path = store.blob_path(digest);
    let file = match std::fs::File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("failed to open blob {digest}")),
    };

    let reader = BufReader::new(flate2::read::GzDecoder::new(file));
    for line in reader.lines() {
        let line = line.with_context(|| format!("failed to read blob {digest}"))?;
        let Some((tag, child, _name)) = parse_listing_line(&line) else {
            continue;
        };

        reachable.insert(child);
        if tag == 'D' {
            traverse(store, &child, reachable, visited_dirs)?;
        }
    }
    Ok(())
}

/// Blobs present on disk but reachable from no snapshot, in digest order
pub fn unreferenced(ctx: &BackupContext) -> Result<Vec<Digest>> {
    let reachable = reachable_digests(ctx)?;
    let existing = ctx.store.enumerate()?;
    Ok(existing
        .into_iter()
        .filter(|digest| !reachable.contains(digest))
        .collect())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PruneStats {
    pub blobs_removed: usize,
    pub bytes_removed: u64,
}

/// Delete every unreferenced blob (or just count them, when `dry_run`)
///
/// A blob that vanished since enumeration is skipped; a failing delete
/// aborts with the counts accumulated so far in the error.
pub fn prune(ctx: &BackupContext, dry_run: bool) -> Result<PruneStats> {
    let mut stats = PruneStats::default();

    for digest in unreferenced(ctx)? {
        let path = ctx.store.blob_path(&digest);
        let size = match std::fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::warn!("failed to stat unreferenced blob {digest}: {e}");
                continue;
            }
        };

        if !dry_run {
            ctx.store.remove(&digest).with_context(|| {
                format!(
                    "prune aborted after removing {} blobs ({} bytes)",
                    stats.blobs_removed, stats.bytes_removed
                )
            })?;
        }

        stats.blobs_removed += 1;
        stats.bytes_removed += size;
    }

    Ok(stats)
}
