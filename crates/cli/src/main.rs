//! Backup CLI - the `backup` command

use anyhow::Result;
use backup_engine::BackupContext;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;
mod util;

/// Content-addressable backup tool with deduplication, incremental backups,
/// and integrity verification
#[derive(Parser)]
#[command(name = "backup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to operate from (default: current directory)
    #[arg(long, short = 'd', global = true)]
    root: Option<PathBuf>,

    /// Backup store directory
    #[arg(long, short = 's', global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a directory as a backup source
    Init {
        /// Directory to initialize (default: current directory)
        path: Option<PathBuf>,
        /// Path to the backup store
        #[arg(long)]
        store: Option<PathBuf>,
        /// Project name (default: directory name)
        #[arg(long)]
        project: Option<String>,
    },
    /// Initialize a new backup store
    InitStore {
        /// Directory to initialize (default: current directory)
        path: Option<PathBuf>,
    },
    /// Create a new snapshot of the source tree
    Backup {
        /// Scan and hash without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Compare the source tree against the latest snapshot
    Status {
        /// Also list entries excluded by ignore rules
        #[arg(long)]
        show_ignored: bool,
    },
    /// List snapshots
    #[command(visible_alias = "list")]
    Snapshots,
    /// Recursively list the contents of a snapshot
    Tree {
        /// Snapshot reference (default: latest)
        reference: Option<String>,
    },
    /// Restore a snapshot, or a path within one
    ///
    /// From a source directory: `restore <snapshot> [path]` restores into
    /// the current directory. From a store: `restore <snapshot> <dest>` or
    /// `restore <snapshot> <path> <dest>`.
    Restore {
        /// Snapshot reference (timestamp or project/timestamp)
        reference: String,
        /// Path inside the snapshot (source mode) or destination (store mode)
        arg1: Option<String>,
        /// Destination directory
        arg2: Option<String>,
    },
    /// Check the integrity of the backup store
    Check {
        /// Also decompress and re-hash every blob (slow)
        #[arg(long)]
        deep: bool,
    },
    /// Remove unreferenced blobs from the store
    Prune {
        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove snapshots, then prune unreferenced blobs
    #[command(visible_alias = "rm", alias = "forget")]
    Remove {
        /// Snapshot references
        #[arg(required = true)]
        references: Vec<String>,
        /// Only report what would be removed
        #[arg(long)]
        dry_run: bool,
    },
    /// Drop hash-cache entries for files that vanished or changed
    PruneCache {
        /// Only report what would be removed
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let Cli {
        root,
        store,
        command,
    } = cli;

    match command {
        // init and init-store run before any context exists
        Commands::Init {
            path,
            store: init_store,
            project,
        } => cmd::init::run(path, init_store.or(store), project),
        Commands::InitStore { path } => cmd::init_store::run(path),

        command => {
            let ctx = BackupContext::resolve(root.as_deref(), store.as_deref())
                .map_err(|e| e.context("error initializing backup"))?;

            match command {
                Commands::Backup { dry_run } => cmd::backup::run(ctx, dry_run),
                Commands::Status { show_ignored } => cmd::status::run(ctx, show_ignored),
                Commands::Snapshots => cmd::snapshots::run(ctx),
                Commands::Tree { reference } => cmd::tree::run(ctx, reference.as_deref()),
                Commands::Restore {
                    reference,
                    arg1,
                    arg2,
                } => cmd::restore::run(ctx, &reference, arg1, arg2),
                Commands::Check { deep } => cmd::check::run(ctx, deep),
                Commands::Prune { dry_run } => cmd::prune::run(ctx, dry_run),
                Commands::Remove {
                    references,
                    dry_run,
                } => cmd::remove::run(ctx, &references, dry_run),
                Commands::PruneCache { dry_run } => cmd::prune_cache::run(ctx, dry_run),
                Commands::Init { .. } | Commands::InitStore { .. } => unreachable!(),
            }
        }
    }
}
