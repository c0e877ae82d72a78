//! Backup context: which source, which store, which project
//!
//! A context is resolved once per invocation and passed to every operation.
//! It owns the blob store and, in source mode, the hash cache; the only
//! process-wide state is the store directory itself.

use crate::config::{self, SourceConfig, STORE_MARKER};
use crate::hash_cache::HashCache;
use anyhow::{Context as _, Result};
use backup_core::BlobStore;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Counters accumulated over one backup run
#[derive(Debug, Default, Clone, Copy)]
pub struct BackupStats {
    pub files_total: usize,
    pub files_archived: usize,
    pub dirs_total: usize,
    pub dirs_archived: usize,
    pub bytes_archived: u64,
}

/// Resolved invocation context
///
/// Source mode: invoked inside a tree carrying `.backup/config.toml`; the
/// source root, project name and hash cache are available. Store mode:
/// invoked against a store only; snapshot-producing operations are
/// unavailable but listing, restore-to-destination, check and prune work.
#[derive(Debug)]
pub struct BackupContext {
    source_root: Option<PathBuf>,
    start_dir: PathBuf,
    store_root: PathBuf,
    project: Option<String>,
    pub store: BlobStore,
    pub hash_cache: Option<HashCache>,
    pub dry_run: bool,
    pub stats: BackupStats,
}

impl BackupContext {
    /// Resolve a context from a start directory and an optional explicit
    /// store path
    ///
    /// Walks up from the start directory looking for `.backup/`; a
    /// `store.toml` inside marks a store, a `config.toml` marks a source
    /// whose config supplies the store path and project name. Without
    /// either, a directory already containing `data/` and `snapshots/` is
    /// adopted as the store.
    pub fn resolve(start_dir: Option<&Path>, store_flag: Option<&Path>) -> Result<Self> {
        let start = match start_dir {
            Some(dir) => absolutize(dir)?,
            None => std::env::current_dir().context("failed to get current directory")?,
        };

        let mut store_root: Option<PathBuf> = match store_flag {
            Some(path) => {
                let expanded = config::expand_tilde(&path.to_string_lossy());
                Some(absolutize(&expanded)?)
            }
            None => None,
        };

        let mut source_root = None;
        let mut project = None;

        if let Some(top) = lookup_top(&start) {
            if top.join(".backup/store.toml").exists() {
                // Running inside a store; no source context
                store_root = Some(top);
            } else if top.join(".backup/config.toml").exists() {
                let config_path = top.join(".backup/config.toml");
                let cfg: SourceConfig = config::load_source_config(&config_path)?;

                if store_root.is_none() {
                    if let Some(setting) = cfg.store.as_deref() {
                        let expanded = config::expand_tilde(setting);
                        store_root = Some(if expanded.is_absolute() {
                            expanded
                        } else {
                            top.join(expanded)
                        });
                    }
                }

                project = cfg.name.clone();
                source_root = Some(top);
            }
        }

        // Fallback: a bare directory that already looks like a store
        if store_root.is_none() && start.join("data").is_dir() && start.join("snapshots").is_dir()
        {
            store_root = Some(start.clone());
        }

        let Some(store_root) = store_root else {
            anyhow::bail!(
                "no backup configuration found\n\n\
                 To get started:\n\
                 \x20 - initialize a new backup store:  backup init-store <path>\n\
                 \x20 - initialize a source directory:  backup init <path> --store <path>\n\
                 \x20 - specify a store explicitly:     backup --store <path> <command>"
            );
        };

        if !store_root.is_dir() {
            anyhow::bail!("backup store is not a directory: {}", store_root.display());
        }

        let data_dir = store_root.join("data");
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let snapshots_dir = store_root.join("snapshots");
        std::fs::create_dir_all(&snapshots_dir)
            .with_context(|| format!("failed to create {}", snapshots_dir.display()))?;

        let marker_dir = store_root.join(".backup");
        std::fs::create_dir_all(&marker_dir)
            .with_context(|| format!("failed to create {}", marker_dir.display()))?;
        let marker = marker_dir.join("store.toml");
        if !marker.exists() {
            if let Err(e) = std::fs::write(&marker, STORE_MARKER) {
                warn!("failed to create store marker {}: {e}", marker.display());
            }
        }

        let hash_cache = match &source_root {
            Some(top) => Some(HashCache::load(top, &top.join(".backup/hash-cache"))?),
            None => None,
        };

        Ok(Self {
            source_root,
            start_dir: start,
            store_root,
            project,
            store: BlobStore::new(data_dir),
            hash_cache,
            dry_run: false,
            stats: BackupStats::default(),
        })
    }

    /// Root of the source tree, when running in source mode
    pub fn source_root(&self) -> Option<&Path> {
        self.source_root.as_deref()
    }

    /// Directory the invocation started from
    pub fn start_dir(&self) -> &Path {
        &self.start_dir
    }

    pub fn store_root(&self) -> &Path {
        &self.store_root
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.store_root.join("snapshots")
    }

    /// Project label grouping this source's snapshots, if configured
    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn is_source_mode(&self) -> bool {
        self.source_root.is_some()
    }

    /// Path of `rel` within the source tree, for display
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.start_dir)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Walk up from `start` to the nearest directory containing `.backup/`
fn lookup_top(start: &Path) -> Option<PathBuf> {
    let mut current = start;
    loop {
        if current.join(".backup").is_dir() {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("failed to get current directory")?
            .join(path))
    }
}

/// Initialize a new backup store at `path`
pub fn init_store(path: &Path) -> Result<PathBuf> {
    let root = absolutize(path)?;
    std::fs::create_dir_all(&root)
        .with_context(|| format!("failed to create directory {}", root.display()))?;

    let marker_dir = root.join(".backup");
    if marker_dir.exists() {
        anyhow::bail!(
            "already initialized as a store or source at {}",
            root.display()
        );
    }

    std::fs::create_dir_all(&marker_dir)?;
    std::fs::write(marker_dir.join("store.toml"), STORE_MARKER)
        .context("failed to write store.toml")?;
    std::fs::create_dir_all(root.join("data"))?;
    std::fs::create_dir_all(root.join("snapshots"))?;
    Ok(root)
}

/// Initialize a directory as a backup source pointed at `store`
pub fn init_source(path: &Path, store: &str, project: &str) -> Result<PathBuf> {
    let root = absolutize(path)?;
    std::fs::create_dir_all(&root)
        .with_context(|| format!("failed to create directory {}", root.display()))?;

    let backup_dir = root.join(".backup");
    if backup_dir.join("config.toml").exists() {
        anyhow::bail!("already initialized as a source at {}", root.display());
    }

    std::fs::create_dir_all(&backup_dir)?;
    config::write_source_config(
        &backup_dir.join("config.toml"),
        &store.replace('\\', "/"),
        project,
    )?;
    Ok(root)
}
