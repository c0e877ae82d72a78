//! Content digests for the blob store
//!
//! Every blob is addressed by the 128-bit hash of its uncompressed bytes,
//! rendered as 32 lowercase hex characters. The digest is the only key into
//! the store; filenames and directory listings carry it verbatim.

use anyhow::{Context, Result};
use md5::{Digest as _, Md5};
use std::io::Read;
use std::path::Path;

/// A 128-bit content digest (16 bytes, 32 hex chars)
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Digest([u8; 16]);

impl Digest {
    /// Create a new Digest from raw bytes
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the digest as a byte slice
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to hex string (32 lowercase characters)
    pub fn to_hex(&self) -> String {
        const HEX_CHARS: &[u8] = b"0123456789abcdef";
        let mut hex = String::with_capacity(32);
        for &byte in &self.0 {
            hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
            hex.push(HEX_CHARS[(byte & 0xf) as usize] as char);
        }
        hex
    }

    /// Parse from hex string (exactly 32 characters)
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 32 {
            anyhow::bail!(
                "invalid digest length: expected 32 hex characters, got {}",
                hex.len()
            );
        }

        let mut bytes = [0u8; 16];
        for i in 0..16 {
            let high = hex_char_to_nibble(hex.as_bytes()[i * 2])?;
            let low = hex_char_to_nibble(hex.as_bytes()[i * 2 + 1])?;
            bytes[i] = (high << 4) | low;
        }
        Ok(Self(bytes))
    }
}

fn hex_char_to_nibble(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => anyhow::bail!("invalid hex character: {}", c as char),
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for Digest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

/// Hash a byte slice
pub fn hash_bytes(data: &[u8]) -> Digest {
    let mut hasher = Md5::new();
    hasher.update(data);
    finalize(hasher)
}

/// Hash a stream without loading it into memory
///
/// Blobs may exceed memory; all hashing of file contents goes through here.
pub fn hash_reader<R: Read>(mut reader: R) -> Result<Digest> {
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(finalize(hasher))
}

/// Hash a file's contents
pub fn hash_file(path: &Path) -> Result<Digest> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {} for hashing", path.display()))?;
    hash_reader(file)
}

fn finalize(hasher: Md5) -> Digest {
    let result = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&result);
    Digest::from_bytes(bytes)
}
