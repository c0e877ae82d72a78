//! Incremental file hash cache
//!
//! Maps `"<mtime_ms> <size> <relpath>"` to a content digest so unchanged
//! files are never rehashed across backups. The cache is only meaningful
//! with a source root; store-only invocations run without one.

use crate::properties;
use anyhow::{Context, Result};
use backup_core::{hash_reader, Digest};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const HEADER: &str = "#backup tool file hash store";

#[derive(Debug)]
pub struct HashCache {
    file: PathBuf,
    root: PathBuf,
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl HashCache {
    /// Load the cache file (missing file = empty cache)
    pub fn load(root: &Path, file: &Path) -> Result<Self> {
        let entries = properties::load(file)?;
        Ok(Self {
            file: file.to_path_buf(),
            root: root.to_path_buf(),
            entries,
            dirty: false,
        })
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Digest of a file, from the cache when `(mtime, size, relpath)` still
    /// matches, otherwise by streaming the file through the hash
    pub fn file_hash(&mut self, path: &Path) -> Result<Digest> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        let key = self.cache_key(path, mtime_ms(&meta)?, meta.len())?;

        if let Some(hex) = self.entries.get(&key) {
            if !hex.is_empty() {
                return Digest::from_hex(hex)
                    .with_context(|| format!("corrupt cache value for {key}"));
            }
        }

        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open {} for hashing", path.display()))?;
        let digest = hash_reader(file)?;

        self.entries.insert(key, digest.to_hex());
        self.dirty = true;
        Ok(digest)
    }

    fn cache_key(&self, path: &Path, mtime_ms: i64, size: u64) -> Result<String> {
        let rel = path.strip_prefix(&self.root).with_context(|| {
            format!("file not in backup directory: {}", path.display())
        })?;
        Ok(format!("{} {} {}", mtime_ms, size, rel.display()))
    }

    /// Drop entries whose file is gone or whose `(mtime, size)` no longer
    /// matches. Returns the number removed.
    pub fn prune(&mut self) -> usize {
        let mut stale = Vec::new();

        for key in self.entries.keys() {
            let Ok((mtime, size, relpath)) = parse_key(key) else {
                stale.push(key.clone());
                continue;
            };

            let meta = match std::fs::metadata(self.root.join(relpath)) {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    stale.push(key.clone());
                    continue;
                }
                // Access error: keep the entry rather than guess
                Err(_) => continue,
            };

            let current_mtime = mtime_ms(&meta).unwrap_or(-1);
            if current_mtime != mtime || meta.len() != size {
                stale.push(key.clone());
            }
        }

        for key in &stale {
            self.entries.remove(key);
        }
        if !stale.is_empty() {
            self.dirty = true;
        }
        stale.len()
    }

    /// Validate every entry: values must be 32 hex chars, keys must parse
    pub fn verify(&self) -> Result<()> {
        for (key, value) in &self.entries {
            if value.len() != 32 {
                anyhow::bail!("invalid digest length {} for cache key '{key}'", value.len());
            }
            if !value.chars().all(|c| c.is_ascii_hexdigit()) {
                anyhow::bail!("invalid digest characters for cache key '{key}': {value}");
            }
            parse_key(key).with_context(|| format!("invalid cache key format: {key}"))?;
        }
        Ok(())
    }

    /// Persist the cache if anything changed, atomically, sorted by relpath
    /// for stable diffs
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let mut sorted: Vec<(&str, &String, &String)> = self
            .entries
            .iter()
            .map(|(key, value)| {
                let path = parse_key(key).map(|(_, _, p)| p).unwrap_or(key.as_str());
                (path, key, value)
            })
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut content = String::with_capacity(self.entries.len() * 64);
        content.push_str(HEADER);
        content.push('\n');
        for (_, key, value) in sorted {
            content.push_str(&properties::escape_key(key));
            content.push('=');
            content.push_str(value);
            content.push('\n');
        }

        let tmp = self.file.with_extension("tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.file)
            .with_context(|| format!("failed to replace {}", self.file.display()))?;

        self.dirty = false;
        Ok(())
    }
}

fn mtime_ms(meta: &std::fs::Metadata) -> Result<i64> {
    let modified = meta.modified().context("filesystem reports no mtime")?;
    match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => Ok(d.as_millis() as i64),
        Err(e) => Ok(-(e.duration().as_millis() as i64)),
    }
}

/// Split a cache key into `(mtime_ms, size, relpath)`
fn parse_key(key: &str) -> Result<(i64, u64, &str)> {
    let (mtime, rest) = key
        .split_once(' ')
        .context("missing timestamp delimiter")?;
    let (size, relpath) = rest.split_once(' ').context("missing size delimiter")?;
    if relpath.is_empty() {
        anyhow::bail!("missing path");
    }
    Ok((
        mtime.parse().context("unparsable mtime")?,
        size.parse().context("unparsable size")?,
        relpath,
    ))
}
