//! Sharded on-disk blob store
//!
//! Blobs are placed at `data/<dd>/<digest>.gz` where `<dd>` is the first two
//! hex characters of the digest. Writes go to `<path>.partial` and are
//! renamed into place, so a crash never leaves a half-written file behind a
//! valid blob name. Leftover `.partial` files are inert and swept by
//! [`BlobStore::cleanup_partials`].

use crate::codec;
use crate::hash::Digest;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const PARTIAL_SUFFIX: &str = ".partial";

/// Content-addressed blob storage rooted at a store's `data/` directory
#[derive(Debug)]
pub struct BlobStore {
    data_dir: PathBuf,
}

impl BlobStore {
    /// Create a blob store over the given `data/` directory
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// The `data/` directory this store owns
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the filesystem path for a blob: `data/<dd>/<digest>.gz`
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        self.data_dir.join(&hex[..2]).join(format!("{hex}.gz"))
    }

    /// Check whether a blob is present
    pub fn contains(&self, digest: &Digest) -> bool {
        self.blob_path(digest).exists()
    }

    /// Size of a blob's compressed file on disk
    pub fn blob_size(&self, digest: &Digest) -> Result<u64> {
        let path = self.blob_path(digest);
        let meta = fs::metadata(&path)
            .with_context(|| format!("failed to stat blob {}", path.display()))?;
        Ok(meta.len())
    }

    /// Store a file's contents under the given digest
    ///
    /// Returns `false` without touching the disk when the blob already
    /// exists (deduplication).
    pub fn put_file(&self, digest: &Digest, src: &Path) -> Result<bool> {
        let dest = self.blob_path(digest);
        if dest.exists() {
            return Ok(false);
        }
        let file = File::open(src)
            .with_context(|| format!("failed to open {} for archiving", src.display()))?;
        self.write_blob(&dest, file)?;
        Ok(true)
    }

    /// Store an in-memory payload under the given digest
    pub fn put_bytes(&self, digest: &Digest, payload: &[u8]) -> Result<bool> {
        let dest = self.blob_path(digest);
        if dest.exists() {
            return Ok(false);
        }
        self.write_blob(&dest, payload)?;
        Ok(true)
    }

    fn write_blob<R: Read>(&self, dest: &Path, payload: R) -> Result<()> {
        let parent = dest.parent().expect("blob path always has a shard parent");
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create shard directory {}", parent.display()))?;

        let mut partial = dest.as_os_str().to_owned();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        let out = File::create(&partial)
            .with_context(|| format!("failed to create {}", partial.display()))?;
        codec::compress_into(payload, &out)?;
        out.sync_all()?;
        drop(out);

        fs::rename(&partial, dest)
            .with_context(|| format!("failed to move blob into place at {}", dest.display()))?;
        Ok(())
    }

    /// Open a blob for streaming decompressed reads
    pub fn reader(&self, digest: &Digest) -> Result<GzDecoder<File>> {
        let path = self.blob_path(digest);
        if !path.exists() {
            anyhow::bail!("missing blob: {digest}");
        }
        codec::open_decompressed(&path)
    }

    /// Read a blob's full payload into memory
    pub fn read_bytes(&self, digest: &Digest) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.reader(digest)?
            .read_to_end(&mut buf)
            .with_context(|| format!("failed to decompress blob {digest}"))?;
        Ok(buf)
    }

    /// Delete a blob; absent is not an error
    pub fn remove(&self, digest: &Digest) -> Result<()> {
        let path = self.blob_path(digest);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("failed to remove blob {}", path.display()))
            }
        }
    }

    /// Enumerate the digests of every blob on disk
    pub fn enumerate(&self) -> Result<BTreeSet<Digest>> {
        let mut all = BTreeSet::new();

        let shards = match fs::read_dir(&self.data_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(all),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read data directory {}", self.data_dir.display())
                })
            }
        };

        for shard in shards {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if let Some(hex) = name.strip_suffix(".gz") {
                    if let Ok(digest) = Digest::from_hex(hex) {
                        all.insert(digest);
                    }
                }
            }
        }
        Ok(all)
    }

    /// Remove any `.partial` files left behind by an interrupted backup
    pub fn cleanup_partials(&self) -> Result<usize> {
        if !self.data_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in WalkDir::new(&self.data_dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                fs::remove_file(entry.path()).with_context(|| {
                    format!("failed to remove partial file {}", entry.path().display())
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
