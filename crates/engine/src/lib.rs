//! Backup Engine - snapshot construction and store maintenance
//!
//! Everything between the raw blob store and the CLI:
//! - context resolution (source tree, store, project name)
//! - ignore rules (`.gitignore` / `.backupignore` chains)
//! - the incremental hash cache
//! - snapshot building, reading, locating and restoring
//! - reachability, pruning and integrity checking
//! - source-vs-snapshot status classification

pub mod check;
pub mod config;
pub mod context;
pub mod entry;
pub mod hash_cache;
pub mod ignore;
pub mod properties;
pub mod reachability;
pub mod reader;
pub mod snapshot;
pub mod status;

pub use check::CheckIssue;
pub use context::{BackupContext, BackupStats};
pub use entry::SourceEntry;
pub use hash_cache::HashCache;
pub use reachability::PruneStats;
pub use reader::SnapshotEntry;
pub use snapshot::SnapshotRoot;

/// Common result type used throughout backup-engine
pub type Result<T> = anyhow::Result<T>;
