//! Store integrity checking
//!
//! Check collects findings instead of aborting: every snapshot in the
//! current project scope is traversed, every referenced blob is verified
//! (existence and, with `deep`, content digest), unreferenced blobs are
//! reported, and the hash cache is validated when one is present. The
//! check fails iff the finding list is non-empty.

use crate::context::BackupContext;
use crate::reachability;
use crate::reader::parse_listing_line;
use crate::snapshot;
use anyhow::{Context, Result};
use backup_core::{codec, BlobStore, Digest};
use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::warn;

/// One finding from an integrity check
#[derive(Debug)]
pub enum CheckIssue {
    /// A referenced blob is absent from the store
    MissingBlob { digest: Digest },
    /// A referenced blob exists but is zero bytes
    EmptyBlob { digest: Digest },
    /// Deep check: gzip failure or content digest mismatch
    CorruptBlob { digest: Digest, reason: String },
    /// A directory listing blob could not be read during traversal
    UnreadableListing { digest: Digest, reason: String },
    /// A blob no snapshot references
    UnreferencedBlob { digest: Digest },
    /// A snapshot head that could not be parsed
    MalformedHead { path: PathBuf, reason: String },
    /// The hash cache failed validation
    CorruptCache { reason: String },
}

impl std::fmt::Display for CheckIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckIssue::MissingBlob { digest } => write!(f, "missing blob: {digest}"),
            CheckIssue::EmptyBlob { digest } => write!(f, "empty blob: {digest}"),
            CheckIssue::CorruptBlob { digest, reason } => {
                write!(f, "corrupted blob {digest}: {reason}")
            }
            CheckIssue::UnreadableListing { digest, reason } => {
                write!(f, "failed to read directory listing {digest}: {reason}")
            }
            CheckIssue::UnreferencedBlob { digest } => {
                write!(f, "unreferenced blob: {digest}")
            }
            CheckIssue::MalformedHead { path, reason } => {
                write!(f, "malformed snapshot head {}: {reason}", path.display())
            }
            CheckIssue::CorruptCache { reason } => {
                write!(f, "hash cache verification failed: {reason}")
            }
        }
    }
}

/// Verify the store; returns every finding instead of stopping at the first
pub fn verify(ctx: &BackupContext, deep: bool) -> Result<Vec<CheckIssue>> {
    let mut issues = Vec::new();
    let mut verified = HashSet::new();
    let mut traversed = HashSet::new();

    let scan = snapshot::scan_heads(&ctx.snapshots_dir(), ctx.project())?;
    for (path, reason) in scan.malformed {
        issues.push(CheckIssue::MalformedHead { path, reason });
    }

    for root in &scan.roots {
        verify_blob(&ctx.store, &root.digest, deep, &mut verified, &mut issues);
        traverse_directory(
            &ctx.store,
            &root.digest,
            deep,
            &mut verified,
            &mut traversed,
            &mut issues,
        );
    }

    for digest in reachability::unreferenced(ctx)? {
        issues.push(CheckIssue::UnreferencedBlob { digest });
    }

    if let Some(cache) = &ctx.hash_cache {
        if let Err(e) = cache.verify() {
            issues.push(CheckIssue::CorruptCache {
                reason: e.to_string(),
            });
        }
    }

    Ok(issues)
}

/// Check one blob's existence (and content, when deep); memoized
fn verify_blob(
    store: &BlobStore,
    digest: &Digest,
    deep: bool,
    verified: &mut HashSet<Digest>,
    issues: &mut Vec<CheckIssue>,
) {
    if !verified.insert(*digest) {
        return;
    }

    let path = store.blob_path(digest);
    let meta = match std::fs::metadata(&path) {
        Ok(meta) => meta,
        Err(_) => {
            issues.push(CheckIssue::MissingBlob { digest: *digest });
            return;
        }
    };
    if meta.len() == 0 {
        issues.push(CheckIssue::EmptyBlob { digest: *digest });
        return;
    }

    if deep {
        if let Err(e) = codec::verify_blob(&path, digest) {
            issues.push(CheckIssue::CorruptBlob {
                digest: *digest,
                reason: e.to_string(),
            });
        }
    }
}

/// Walk a directory listing, verifying children and descending into
/// subdirectories; shared subtrees are traversed once
fn traverse_directory(
    store: &BlobStore,
    digest: &Digest,
    deep: bool,
    verified: &mut HashSet<Digest>,
    traversed: &mut HashSet<Digest>,
    issues: &mut Vec<CheckIssue>,
) {
    if !traversed.insert(*digest) {
        return;
    }

    let path = store.blob_path(digest);
    let file = match std::fs::File::open(&path) {
        // Missing was already recorded by verify_blob; nothing to descend into
        Err(_) => return,
        Ok(file) => file,
    };

    let reader = BufReader::new(flate2::read::GzDecoder::new(file));
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                issues.push(CheckIssue::UnreadableListing {
                    digest: *digest,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let Some((tag, child, _name)) = parse_listing_line(&line) else {
            warn!("invalid directory entry in {digest}: {line:?}");
            continue;
        };

        verify_blob(store, &child, deep, verified, issues);
        if tag == 'D' {
            traverse_directory(store, &child, deep, verified, traversed, issues);
        }
    }
}

/// Convenience for callers that only need pass/fail
pub fn verify_ok(ctx: &BackupContext, deep: bool) -> Result<()> {
    let issues = verify(ctx, deep)?;
    if issues.is_empty() {
        return Ok(());
    }
    let summary: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
    anyhow::bail!("store integrity check failed:\n  {}", summary.join("\n  "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;
    use crate::entry::scan_source;
    use backup_core::hash_bytes;
    use std::path::{Path, PathBuf};

    fn backed_up_source(temp_dir: &Path, files: &[(&str, &str)]) -> Result<(PathBuf, BackupContext)> {
        let store_dir = temp_dir.join("store");
        if !store_dir.exists() {
            context::init_store(&store_dir)?;
        }
        let source =
            context::init_source(&temp_dir.join("src"), &store_dir.to_string_lossy(), "proj")?;
        for (rel, content) in files {
            let path = source.join(rel);
            std::fs::create_dir_all(path.parent().unwrap())?;
            std::fs::write(path, content)?;
        }

        let mut ctx = BackupContext::resolve(Some(&source), None)?;
        let root = scan_source(&mut ctx, &source)?;
        root.save(&mut ctx)?;
        snapshot::write_head(&ctx.snapshots_dir(), ctx.project(), &root.digest)?;
        Ok((source, ctx))
    }

    #[test]
    fn test_clean_store_passes() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let (_source, ctx) =
            backed_up_source(temp_dir.path(), &[("a.txt", "alpha"), ("sub/b.txt", "beta")])?;

        assert!(verify(&ctx, false)?.is_empty());
        assert!(verify(&ctx, true)?.is_empty());
        verify_ok(&ctx, true)?;
        Ok(())
    }

    #[test]
    fn test_missing_blob_detected() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let (_source, ctx) = backed_up_source(temp_dir.path(), &[("a.txt", "alpha")])?;

        ctx.store.remove(&hash_bytes(b"alpha"))?;

        let issues = verify(&ctx, false)?;
        assert!(issues
            .iter()
            .any(|i| matches!(i, CheckIssue::MissingBlob { digest } if *digest == hash_bytes(b"alpha"))));
        Ok(())
    }

    #[test]
    fn test_empty_blob_detected() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let (_source, ctx) = backed_up_source(temp_dir.path(), &[("a.txt", "alpha")])?;

        let digest = hash_bytes(b"alpha");
        std::fs::write(ctx.store.blob_path(&digest), b"")?;

        let issues = verify(&ctx, false)?;
        assert!(issues
            .iter()
            .any(|i| matches!(i, CheckIssue::EmptyBlob { digest: d } if *d == digest)));
        Ok(())
    }

    #[test]
    fn test_corrupt_file_blob_needs_deep_check() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let (_source, ctx) = backed_up_source(temp_dir.path(), &[("a.txt", "alpha")])?;

        // Replace a leaf blob with non-gzip bytes of nonzero length
        let digest = hash_bytes(b"alpha");
        std::fs::write(ctx.store.blob_path(&digest), b"not gzip at all")?;

        // Shallow check only stats leaf blobs
        assert!(verify(&ctx, false)?.is_empty());

        let issues = verify(&ctx, true)?;
        assert!(issues
            .iter()
            .any(|i| matches!(i, CheckIssue::CorruptBlob { digest: d, .. } if *d == digest)));
        Ok(())
    }

    #[test]
    fn test_corrupt_directory_blob_fails_shallow() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let (_source, ctx) = backed_up_source(temp_dir.path(), &[("sub/b.txt", "beta")])?;

        // The root listing names sub; clobber sub's listing blob
        let sub_listing = format!("F {} b.txt\n", hash_bytes(b"beta"));
        let sub_digest = hash_bytes(sub_listing.as_bytes());
        std::fs::write(ctx.store.blob_path(&sub_digest), b"garbage, not gzip")?;

        let issues = verify(&ctx, false)?;
        assert!(issues
            .iter()
            .any(|i| matches!(i, CheckIssue::UnreadableListing { digest, .. } if *digest == sub_digest)));
        Ok(())
    }

    #[test]
    fn test_unreferenced_blob_reported() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let (_source, ctx) = backed_up_source(temp_dir.path(), &[("a.txt", "alpha")])?;

        let stray = hash_bytes(b"orphan");
        ctx.store.put_bytes(&stray, b"orphan")?;

        let issues = verify(&ctx, false)?;
        assert!(issues
            .iter()
            .any(|i| matches!(i, CheckIssue::UnreferencedBlob { digest } if *digest == stray)));
        Ok(())
    }

    #[test]
    fn test_malformed_head_reported() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let (_source, ctx) = backed_up_source(temp_dir.path(), &[("a.txt", "alpha")])?;

        let empty_head = ctx.snapshots_dir().join("proj/250101-000000");
        std::fs::write(&empty_head, "")?;

        let issues = verify(&ctx, false)?;
        assert!(issues
            .iter()
            .any(|i| matches!(i, CheckIssue::MalformedHead { path, .. } if *path == empty_head)));
        Ok(())
    }

    #[test]
    fn test_corrupt_cache_reported() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let (source, _ctx) = backed_up_source(temp_dir.path(), &[("a.txt", "alpha")])?;

        std::fs::write(
            source.join(".backup/hash-cache"),
            "broken key=zz\n",
        )?;
        let ctx = BackupContext::resolve(Some(&source), None)?;

        let issues = verify(&ctx, false)?;
        assert!(issues
            .iter()
            .any(|i| matches!(i, CheckIssue::CorruptCache { .. })));
        Ok(())
    }

    #[test]
    fn test_missing_directory_blob_skips_descent() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let (_source, ctx) = backed_up_source(temp_dir.path(), &[("sub/b.txt", "beta")])?;

        let sub_listing = format!("F {} b.txt\n", hash_bytes(b"beta"));
        let sub_digest = hash_bytes(sub_listing.as_bytes());
        ctx.store.remove(&sub_digest)?;

        let issues = verify(&ctx, false)?;
        // The missing listing is reported; the leaf below it is unreachable
        // from traversal but surfaces as unreferenced instead
        assert!(issues
            .iter()
            .any(|i| matches!(i, CheckIssue::MissingBlob { digest } if *digest == sub_digest)));
        assert!(issues
            .iter()
            .any(|i| matches!(i, CheckIssue::UnreferencedBlob { digest } if *digest == hash_bytes(b"beta"))));
        Ok(())
    }
}
