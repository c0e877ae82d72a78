//! Source-tree scanning and snapshot construction
//!
//! The builder walks the source bottom-up: children are hashed first,
//! directory listings are derived from the sorted children, and a
//! directory's own digest is the hash of its listing text. Saving writes
//! child blobs before the listing that names them, so an interrupted backup
//! never leaves a listing pointing at blobs that were not yet written.

use crate::context::BackupContext;
use crate::ignore::{IgnoreChain, MatchedPattern};
use anyhow::{Context, Result};
use backup_core::{hash_bytes, hash_file, Digest};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// An entry in the source tree destined for a snapshot
pub enum SourceEntry {
    File(FileEntry),
    Link(LinkEntry),
    Directory(DirEntry),
}

pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    pub digest: Digest,
    pub size: u64,
}

pub struct LinkEntry {
    pub path: PathBuf,
    pub name: String,
    pub target: String,
    pub digest: Digest,
}

pub struct DirEntry {
    pub path: PathBuf,
    pub name: String,
    pub digest: Digest,
    pub listing: String,
    pub children: Vec<SourceEntry>,
    pub ignored: Vec<IgnoredEntry>,
}

/// A candidate excluded by the ignore chain, with the pattern that did it
pub struct IgnoredEntry {
    pub path: PathBuf,
    pub name: String,
    pub reason: MatchedPattern,
}

impl SourceEntry {
    pub fn name(&self) -> &str {
        match self {
            SourceEntry::File(e) => &e.name,
            SourceEntry::Link(e) => &e.name,
            SourceEntry::Directory(e) => &e.name,
        }
    }

    pub fn digest(&self) -> &Digest {
        match self {
            SourceEntry::File(e) => &e.digest,
            SourceEntry::Link(e) => &e.digest,
            SourceEntry::Directory(e) => &e.digest,
        }
    }

    /// Tag used in directory listings
    pub fn type_char(&self) -> char {
        match self {
            SourceEntry::File(_) => 'F',
            SourceEntry::Directory(_) => 'D',
            SourceEntry::Link(_) => 'L',
        }
    }

    /// Position of this entry's kind in the listing sort order
    fn type_rank(&self) -> u8 {
        match self {
            SourceEntry::File(_) => 0,
            SourceEntry::Directory(_) => 1,
            SourceEntry::Link(_) => 2,
        }
    }

    fn save(&self, ctx: &mut BackupContext) -> Result<()> {
        match self {
            SourceEntry::File(e) => e.save(ctx),
            SourceEntry::Link(e) => e.save(ctx),
            SourceEntry::Directory(e) => e.save(ctx),
        }
    }
}

/// Scan the whole source tree rooted at `path`
pub fn scan_source(ctx: &mut BackupContext, path: &Path) -> Result<DirEntry> {
    let mut chain = IgnoreChain::new();
    scan_directory(ctx, path, &mut chain)
}

fn scan_directory(
    ctx: &mut BackupContext,
    path: &Path,
    chain: &mut IgnoreChain,
) -> Result<DirEntry> {
    chain.push(path);
    let result = scan_children(ctx, path, chain);
    chain.pop();
    let (children, ignored) = result?;

    let listing = serialize_listing(&children);
    let digest = hash_bytes(listing.as_bytes());

    Ok(DirEntry {
        path: path.to_path_buf(),
        name: file_name(path),
        digest,
        listing,
        children,
        ignored,
    })
}

fn scan_children(
    ctx: &mut BackupContext,
    path: &Path,
    chain: &mut IgnoreChain,
) -> Result<(Vec<SourceEntry>, Vec<IgnoredEntry>)> {
    let mut children = Vec::new();
    let mut ignored = Vec::new();

    let read_dir = match std::fs::read_dir(path) {
        Ok(rd) => rd,
        Err(e) => {
            warn!("skipping unreadable directory {}: {e}", path.display());
            return Ok((children, ignored));
        }
    };

    for dirent in read_dir {
        let dirent = dirent?;
        let name = dirent.file_name().to_string_lossy().into_owned();
        if name == ".backup" {
            continue;
        }

        let full_path = dirent.path();
        // lstat before stat: symlinks are captured as links, never followed
        let meta = std::fs::symlink_metadata(&full_path)
            .with_context(|| format!("failed to stat {}", full_path.display()))?;
        let is_dir = meta.is_dir();

        if let Some(reason) = chain.ignored(&full_path, is_dir) {
            ignored.push(IgnoredEntry {
                path: full_path,
                name,
                reason,
            });
            continue;
        }

        if meta.file_type().is_symlink() {
            let target = std::fs::read_link(&full_path)
                .with_context(|| format!("failed to read link {}", full_path.display()))?;
            let target = target.to_string_lossy().into_owned();
            children.push(SourceEntry::Link(LinkEntry {
                digest: hash_bytes(target.as_bytes()),
                path: full_path,
                name,
                target,
            }));
        } else if is_dir {
            children.push(SourceEntry::Directory(scan_directory(
                ctx, &full_path, chain,
            )?));
        } else {
            let digest = match ctx.hash_cache.as_mut() {
                Some(cache) => cache.file_hash(&full_path)?,
                None => hash_file(&full_path)?,
            };
            children.push(SourceEntry::File(FileEntry {
                digest,
                path: full_path,
                name,
                size: meta.len(),
            }));
        }
    }

    children.sort_by(|a, b| {
        (a.type_rank(), a.digest().as_bytes(), a.name()).cmp(&(
            b.type_rank(),
            b.digest().as_bytes(),
            b.name(),
        ))
    });

    Ok((children, ignored))
}

/// Directory payload: one `<T> <digest> <name>` line per child
fn serialize_listing(children: &[SourceEntry]) -> String {
    let mut listing = String::new();
    for child in children {
        listing.push(child.type_char());
        listing.push(' ');
        listing.push_str(&child.digest().to_hex());
        listing.push(' ');
        listing.push_str(child.name());
        listing.push('\n');
    }
    listing
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string())
}

impl FileEntry {
    fn save(&self, ctx: &mut BackupContext) -> Result<()> {
        ctx.stats.files_total += 1;
        if ctx.store.contains(&self.digest) {
            return Ok(());
        }

        ctx.stats.files_archived += 1;
        ctx.stats.bytes_archived += self.size;

        if ctx.dry_run {
            return Ok(());
        }

        info!("archiving {}", self.path.display());
        ctx.store.put_file(&self.digest, &self.path)?;
        Ok(())
    }
}

impl LinkEntry {
    fn save(&self, ctx: &mut BackupContext) -> Result<()> {
        ctx.stats.files_total += 1;
        if ctx.store.contains(&self.digest) {
            return Ok(());
        }

        ctx.stats.files_archived += 1;

        if ctx.dry_run {
            return Ok(());
        }

        info!("archiving link {} -> {}", self.path.display(), self.target);
        ctx.store.put_bytes(&self.digest, self.target.as_bytes())?;
        Ok(())
    }
}

impl DirEntry {
    /// Save this directory's subtree: children first, then the listing blob
    pub fn save(&self, ctx: &mut BackupContext) -> Result<()> {
        for child in &self.children {
            child.save(ctx)?;
        }

        ctx.stats.dirs_total += 1;
        if ctx.store.contains(&self.digest) {
            return Ok(());
        }

        ctx.stats.dirs_archived += 1;

        if ctx.dry_run {
            return Ok(());
        }

        ctx.store.put_bytes(&self.digest, self.listing.as_bytes())?;
        Ok(())
    }
}
