//! Backup Core - Content-addressed storage primitives for the backup store
//!
//! This crate provides the foundational storage layer:
//! - 128-bit content digests rendered as 32-char lowercase hex
//! - Gzip codec for blob payloads
//! - Sharded on-disk blob store with atomic placement

pub mod codec;
pub mod hash;
pub mod store;

// Re-export main types for convenience
pub use hash::{hash_bytes, hash_file, hash_reader, Digest};
pub use store::BlobStore;

/// Common result type used throughout backup-core
pub type Result<T> = anyhow::Result<T>;
