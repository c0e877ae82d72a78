//! Gzip codec for blob payloads
//!
//! Blobs live on disk gzip-compressed; digests always refer to the
//! uncompressed bytes. Compression and verification both stream, so blobs
//! larger than memory are fine.

use crate::hash::{hash_reader, Digest};
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Compress a stream into a writer, returning the number of payload bytes
pub fn compress_into<R: Read, W: Write>(mut reader: R, writer: W) -> Result<u64> {
    let mut encoder = GzEncoder::new(writer, Compression::default());
    let written = std::io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?;
    Ok(written)
}

/// Open a gzip file for streaming decompression
pub fn open_decompressed(path: &Path) -> Result<GzDecoder<File>> {
    let file =
        File::open(path).with_context(|| format!("failed to open blob {}", path.display()))?;
    Ok(GzDecoder::new(file))
}

/// Decompress a gzip file and hash its payload
pub fn content_digest(path: &Path) -> Result<Digest> {
    let decoder = open_decompressed(path)?;
    hash_reader(decoder).with_context(|| format!("failed to decompress {}", path.display()))
}

/// Verify that a blob's payload hashes to the expected digest
///
/// Fails on gzip errors and on digest mismatch; the error message carries
/// which of the two happened.
pub fn verify_blob(path: &Path, expected: &Digest) -> Result<()> {
    let actual = content_digest(path)?;
    if actual != *expected {
        anyhow::bail!("digest mismatch: expected {}, got {}", expected, actual);
    }
    Ok(())
}
