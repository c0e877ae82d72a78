//! Reading and restoring snapshot trees
//!
//! A snapshot is a lazy tree over the blob store: a directory entry holds
//! only its digest, and its children materialize when the listing blob is
//! read. Listing lines are `<T> <digest> <name>`, parsed at fixed offsets.

use anyhow::{Context, Result};
use backup_core::{BlobStore, Digest};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

/// An entry read back from a snapshot
#[derive(Debug, Clone)]
pub enum SnapshotEntry {
    File(EntryRef),
    Link(EntryRef),
    Directory(SnapshotDir),
}

/// A leaf entry: just its digest and name
#[derive(Debug, Clone)]
pub struct EntryRef {
    pub digest: Digest,
    pub name: String,
}

/// A directory entry; children are read on demand
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    pub digest: Digest,
    pub name: String,
}

impl SnapshotEntry {
    pub fn name(&self) -> &str {
        match self {
            SnapshotEntry::File(e) | SnapshotEntry::Link(e) => &e.name,
            SnapshotEntry::Directory(d) => &d.name,
        }
    }

    pub fn digest(&self) -> &Digest {
        match self {
            SnapshotEntry::File(e) | SnapshotEntry::Link(e) => &e.digest,
            SnapshotEntry::Directory(d) => &d.digest,
        }
    }

    /// Restore this entry to `dest`, overwriting whatever is there
    pub fn restore(&self, store: &BlobStore, dest: &Path) -> Result<()> {
        match self {
            SnapshotEntry::File(e) => restore_file(store, e, dest),
            SnapshotEntry::Link(e) => restore_link(store, e, dest),
            SnapshotEntry::Directory(d) => d.restore(store, dest),
        }
    }
}

/// Parse one listing line at fixed offsets
///
/// `T SP digest SP name`: type at 0, separators at 1 and 34, digest at
/// 2..34, name from 35. Shorter or misaligned lines yield `None`.
pub fn parse_listing_line(line: &str) -> Option<(char, Digest, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < 36 || bytes[1] != b' ' || bytes[34] != b' ' {
        return None;
    }
    let digest = Digest::from_hex(&line[2..34]).ok()?;
    Some((bytes[0] as char, digest, &line[35..]))
}

impl SnapshotDir {
    /// Read and parse this directory's listing blob
    ///
    /// Malformed lines and unknown type tags are skipped with a warning;
    /// names are unique within a directory so the result is a map.
    pub fn entries(&self, store: &BlobStore) -> Result<BTreeMap<String, SnapshotEntry>> {
        let mut entries = BTreeMap::new();

        let reader = BufReader::new(store.reader(&self.digest)?);
        for line in reader.lines() {
            let line =
                line.with_context(|| format!("failed to read listing blob {}", self.digest))?;

            let Some((tag, digest, name)) = parse_listing_line(&line) else {
                warn!("invalid directory entry in {}: {line:?}", self.digest);
                continue;
            };

            let name = name.to_string();
            let entry = match tag {
                'F' => SnapshotEntry::File(EntryRef {
                    digest,
                    name: name.clone(),
                }),
                'L' => SnapshotEntry::Link(EntryRef {
                    digest,
                    name: name.clone(),
                }),
                'D' => SnapshotEntry::Directory(SnapshotDir {
                    digest,
                    name: name.clone(),
                }),
                other => {
                    warn!("unknown entry type '{other}' in {}", self.digest);
                    continue;
                }
            };
            entries.insert(name, entry);
        }

        Ok(entries)
    }

    /// Find an entry by relative path; both `/` and `\` separate components
    ///
    /// Returns `None` when a component is absent or a non-terminal
    /// component is not a directory.
    pub fn locate(&self, store: &BlobStore, relpath: &str) -> Result<Option<SnapshotEntry>> {
        let normalized = relpath.replace('\\', "/");
        let parts: Vec<&str> = normalized
            .split('/')
            .filter(|p| !p.is_empty() && *p != ".")
            .collect();

        if parts.is_empty() {
            return Ok(Some(SnapshotEntry::Directory(self.clone())));
        }

        let mut current = self.clone();
        for (i, part) in parts.iter().enumerate() {
            let mut entries = current.entries(store)?;
            let Some(entry) = entries.remove(*part) else {
                return Ok(None);
            };

            if i == parts.len() - 1 {
                return Ok(Some(entry));
            }

            match entry {
                SnapshotEntry::Directory(dir) => current = dir,
                // Path continues through a non-directory
                _ => return Ok(None),
            }
        }
        unreachable!("loop returns on the last component");
    }

    /// Restore the whole subtree into `dest`
    pub fn restore(&self, store: &BlobStore, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest)
            .with_context(|| format!("failed to create directory {}", dest.display()))?;

        for (name, entry) in self.entries(store)? {
            entry.restore(store, &dest.join(name))?;
        }
        Ok(())
    }
}

fn ensure_parent(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn restore_file(store: &BlobStore, entry: &EntryRef, dest: &Path) -> Result<()> {
    ensure_parent(dest)?;

    let mut reader = store.reader(&entry.digest)?;
    let mut out = std::fs::File::create(dest)
        .with_context(|| format!("failed to create {}", dest.display()))?;
    std::io::copy(&mut reader, &mut out)
        .with_context(|| format!("failed to restore {}", dest.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o644))?;
    }
    Ok(())
}

fn restore_link(store: &BlobStore, entry: &EntryRef, dest: &Path) -> Result<()> {
    let target = String::from_utf8(store.read_bytes(&entry.digest)?)
        .with_context(|| format!("link target for {} is not valid UTF-8", entry.name))?;

    ensure_parent(dest)?;

    // Remove whatever occupies the destination, symlink or not
    if std::fs::symlink_metadata(dest).is_ok() {
        std::fs::remove_file(dest)
            .with_context(|| format!("failed to remove existing {}", dest.display()))?;
    }

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&target, dest)
            .with_context(|| format!("failed to create symlink {}", dest.display()))?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        anyhow::bail!(
            "cannot restore symlink {} -> {target}: symlinks are not supported on this platform",
            dest.display()
        );
    }
}
