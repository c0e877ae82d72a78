//! End-to-end scenarios driven through the engine API: backup, dedup,
//! remove, prune, restore, check.

use anyhow::Result;
use backup_core::hash_bytes;
use backup_engine::{check, context, reachability, snapshot, BackupContext};
use std::path::{Path, PathBuf};

struct Fixture {
    temp: tempfile::TempDir,
    store: PathBuf,
}

impl Fixture {
    fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let store = context::init_store(&temp.path().join("store"))?;
        Ok(Self { temp, store })
    }

    fn new_source(&self, name: &str, files: &[(&str, &str)]) -> Result<PathBuf> {
        let source = context::init_source(
            &self.temp.path().join(name),
            &self.store.to_string_lossy(),
            name,
        )?;
        for (rel, content) in files {
            let path = source.join(rel);
            std::fs::create_dir_all(path.parent().unwrap())?;
            std::fs::write(path, content)?;
        }
        Ok(source)
    }

    fn ctx(&self, source: &Path) -> Result<BackupContext> {
        BackupContext::resolve(Some(source), None)
    }

    fn backup(&self, source: &Path) -> Result<(BackupContext, snapshot::CreateOutcome)> {
        let mut ctx = self.ctx(source)?;
        let outcome = snapshot::create(&mut ctx)?;
        Ok((ctx, outcome))
    }
}

#[test]
fn duplicate_content_stores_one_blob() -> Result<()> {
    // Source {a.txt:"hi", sub/b.txt:"hi"}: exactly one file blob for "hi",
    // referenced from two listings
    let fixture = Fixture::new()?;
    let source = fixture.new_source("proj", &[("a.txt", "hi"), ("sub/b.txt", "hi")])?;
    let (ctx, outcome) = fixture.backup(&source)?;

    let hi = hash_bytes(b"hi");
    assert!(ctx.store.contains(&hi));

    // Blobs: "hi", sub's listing, root's listing
    assert_eq!(ctx.store.enumerate()?.len(), 3);

    let root_listing = String::from_utf8(ctx.store.read_bytes(&outcome.root_digest)?)?;
    let sub_digest = root_listing
        .lines()
        .find(|l| l.starts_with('D'))
        .map(|l| l[2..34].to_string())
        .unwrap();
    let sub_listing =
        String::from_utf8(ctx.store.read_bytes(&sub_digest.parse()?)?)?;

    assert!(root_listing.contains(&hi.to_hex()));
    assert!(sub_listing.contains(&hi.to_hex()));
    Ok(())
}

#[test]
fn backup_is_idempotent() -> Result<()> {
    let fixture = Fixture::new()?;
    let source = fixture.new_source("proj", &[("a.txt", "alpha"), ("b/c.txt", "gamma")])?;

    let (_, first) = fixture.backup(&source)?;
    let (ctx, second) = fixture.backup(&source)?;

    assert_eq!(first.root_digest, second.root_digest);
    assert_eq!(ctx.stats.files_archived, 0);
    assert_eq!(ctx.stats.dirs_archived, 0);
    assert_eq!(ctx.stats.bytes_archived, 0);
    Ok(())
}

#[test]
fn modify_then_backup_keeps_both_snapshots() -> Result<()> {
    let fixture = Fixture::new()?;
    let source = fixture.new_source("proj", &[("a.txt", "hi")])?;

    fixture.backup(&source)?;
    std::fs::write(source.join("a.txt"), "ho")?;
    let (ctx, _) = fixture.backup(&source)?;

    let roots = snapshot::project_roots(&ctx.snapshots_dir(), ctx.project())?;
    assert_eq!(roots.len(), 2);

    let dest = fixture.temp.path().join("restore-old");
    roots[0].top().restore(&ctx.store, &dest)?;
    assert_eq!(std::fs::read(dest.join("a.txt"))?, b"hi");

    let dest = fixture.temp.path().join("restore-new");
    roots[1].top().restore(&ctx.store, &dest)?;
    assert_eq!(std::fs::read(dest.join("a.txt"))?, b"ho");

    check::verify_ok(&ctx, true)?;
    Ok(())
}

#[test]
fn remove_head_then_prune_reclaims_blobs() -> Result<()> {
    let fixture = Fixture::new()?;
    let source = fixture.new_source("proj", &[("a.txt", "hi")])?;

    fixture.backup(&source)?;
    std::fs::write(source.join("a.txt"), "ho")?;
    let (ctx, second) = fixture.backup(&source)?;

    // Drop the older head; its unshared blobs become unreferenced
    let roots = snapshot::project_roots(&ctx.snapshots_dir(), ctx.project())?;
    std::fs::remove_file(&roots[0].head_path)?;

    let orphaned = reachability::unreferenced(&ctx)?;
    assert!(!orphaned.is_empty());
    assert!(check::verify(&ctx, false)?
        .iter()
        .any(|i| matches!(i, check::CheckIssue::UnreferencedBlob { .. })));

    let dry = reachability::prune(&ctx, true)?;
    assert_eq!(dry.blobs_removed, orphaned.len());

    let stats = reachability::prune(&ctx, false)?;
    assert_eq!(stats.blobs_removed, orphaned.len());
    assert!(stats.bytes_removed > 0);

    // The surviving snapshot is intact and restores exactly
    check::verify_ok(&ctx, true)?;
    let remaining = snapshot::project_roots(&ctx.snapshots_dir(), ctx.project())?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].digest, second.root_digest);

    let dest = fixture.temp.path().join("restored");
    remaining[0].top().restore(&ctx.store, &dest)?;
    assert_eq!(std::fs::read(dest.join("a.txt"))?, b"ho");
    Ok(())
}

#[test]
fn prune_from_one_project_spares_the_other() -> Result<()> {
    let fixture = Fixture::new()?;
    let one = fixture.new_source("one", &[("a.txt", "only-in-one")])?;
    let two = fixture.new_source("two", &[("b.txt", "only-in-two")])?;

    fixture.backup(&one)?;
    fixture.backup(&two)?;

    // Prune run from project one's context must delete nothing
    let ctx_one = fixture.ctx(&one)?;
    let stats = reachability::prune(&ctx_one, false)?;
    assert_eq!(stats.blobs_removed, 0);

    assert!(ctx_one.store.contains(&hash_bytes(b"only-in-one")));
    assert!(ctx_one.store.contains(&hash_bytes(b"only-in-two")));

    let ctx_two = fixture.ctx(&two)?;
    check::verify_ok(&ctx_two, true)?;
    Ok(())
}

#[test]
fn cross_project_dedup_shares_blobs() -> Result<()> {
    let fixture = Fixture::new()?;
    let one = fixture.new_source("one", &[("x.txt", "shared bytes")])?;
    let two = fixture.new_source("two", &[("y.txt", "shared bytes")])?;

    fixture.backup(&one)?;
    let (ctx, _) = fixture.backup(&two)?;

    // One blob for the shared content, whatever the file is named
    let digest = hash_bytes(b"shared bytes");
    assert!(ctx.store.contains(&digest));
    assert_eq!(
        ctx.store
            .enumerate()?
            .iter()
            .filter(|d| **d == digest)
            .count(),
        1
    );
    assert_eq!(ctx.stats.bytes_archived, 0);
    Ok(())
}

#[test]
fn ignored_files_stay_out_of_snapshots() -> Result<()> {
    let fixture = Fixture::new()?;
    let source = fixture.new_source(
        "proj",
        &[("keep.txt", "keep me"), ("x.log", "log noise")],
    )?;
    std::fs::write(source.join(".backupignore"), "*.log\n")?;

    let (ctx, outcome) = fixture.backup(&source)?;

    // No blob holds the ignored file's bytes, and no listing names it
    assert!(!ctx.store.contains(&hash_bytes(b"log noise")));
    let root_listing = String::from_utf8(ctx.store.read_bytes(&outcome.root_digest)?)?;
    assert!(!root_listing.contains("x.log"));
    assert!(root_listing.contains("keep.txt"));
    Ok(())
}

#[test]
fn dry_run_writes_nothing_but_counts() -> Result<()> {
    let fixture = Fixture::new()?;
    let source = fixture.new_source("proj", &[("a.txt", "alpha")])?;

    let mut ctx = fixture.ctx(&source)?;
    ctx.dry_run = true;
    let outcome = snapshot::create(&mut ctx)?;

    assert!(outcome.timestamp.is_none());
    assert_eq!(ctx.stats.files_archived, 1);
    assert!(ctx.store.enumerate()?.is_empty());
    assert!(snapshot::project_roots(&ctx.snapshots_dir(), ctx.project())?.is_empty());
    // Dry runs leave no hash cache behind either
    assert!(!source.join(".backup/hash-cache").exists());
    Ok(())
}

#[test]
fn corrupt_blob_detection_depths() -> Result<()> {
    let fixture = Fixture::new()?;
    let source = fixture.new_source("proj", &[("a.txt", "alpha"), ("sub/b.txt", "beta")])?;
    let (ctx, _) = fixture.backup(&source)?;

    // Corrupt the leaf blob: shallow check passes, deep check does not
    let leaf = hash_bytes(b"alpha");
    std::fs::write(ctx.store.blob_path(&leaf), b"replaced with junk")?;

    assert!(check::verify(&ctx, false)?.is_empty());
    let deep = check::verify(&ctx, true)?;
    assert!(deep
        .iter()
        .any(|i| matches!(i, check::CheckIssue::CorruptBlob { digest, .. } if *digest == leaf)));

    // Corrupt a directory blob: even the shallow check fails
    let sub_listing = format!("F {} b.txt\n", hash_bytes(b"beta"));
    let sub_digest = hash_bytes(sub_listing.as_bytes());
    std::fs::write(ctx.store.blob_path(&sub_digest), b"also junk")?;

    assert!(!check::verify(&ctx, false)?.is_empty());
    Ok(())
}

#[test]
fn restore_single_path_roundtrip() -> Result<()> {
    let fixture = Fixture::new()?;
    let source = fixture.new_source(
        "proj",
        &[("docs/readme.md", "# hello\n"), ("src/main.c", "int main;\n")],
    )?;
    let (ctx, _) = fixture.backup(&source)?;

    let root = snapshot::latest(&ctx.snapshots_dir(), ctx.project())?.unwrap();
    let entry = root.top().locate(&ctx.store, "docs/readme.md")?.unwrap();

    let dest = fixture.temp.path().join("out/readme.md");
    entry.restore(&ctx.store, &dest)?;
    assert_eq!(std::fs::read_to_string(&dest)?, "# hello\n");

    assert!(root.top().locate(&ctx.store, "docs/absent.md")?.is_none());
    Ok(())
}

#[cfg(unix)]
#[test]
fn symlink_roundtrip() -> Result<()> {
    let fixture = Fixture::new()?;
    let source = fixture.new_source("proj", &[("real.txt", "pointed at")])?;
    std::os::unix::fs::symlink("real.txt", source.join("alias"))?;

    let (ctx, _) = fixture.backup(&source)?;

    let root = snapshot::latest(&ctx.snapshots_dir(), ctx.project())?.unwrap();
    let dest = fixture.temp.path().join("restored");
    root.top().restore(&ctx.store, &dest)?;

    assert_eq!(
        std::fs::read_link(dest.join("alias"))?,
        Path::new("real.txt")
    );
    assert_eq!(std::fs::read(dest.join("real.txt"))?, b"pointed at");
    Ok(())
}

#[test]
fn hash_cache_persists_across_backups() -> Result<()> {
    let fixture = Fixture::new()?;
    let source = fixture.new_source("proj", &[("a.txt", "alpha")])?;

    fixture.backup(&source)?;
    let cache_file = source.join(".backup/hash-cache");
    assert!(cache_file.exists());
    let first = std::fs::read_to_string(&cache_file)?;
    assert!(first.contains(&hash_bytes(b"alpha").to_hex()));

    // Unchanged source: cache already clean, file not rewritten differently
    fixture.backup(&source)?;
    assert_eq!(std::fs::read_to_string(&cache_file)?, first);
    Ok(())
}

#[test]
fn interrupted_write_is_swept_on_next_backup() -> Result<()> {
    let fixture = Fixture::new()?;
    let source = fixture.new_source("proj", &[("a.txt", "alpha")])?;
    let (ctx, _) = fixture.backup(&source)?;

    // Fake a crash mid-write
    let digest = hash_bytes(b"alpha");
    let mut partial = ctx.store.blob_path(&digest).into_os_string();
    partial.push(".partial");
    std::fs::write(&partial, b"half a blob")?;

    fixture.backup(&source)?;
    assert!(!Path::new(&partial).exists());
    check::verify_ok(&fixture.ctx(&source)?, true)?;
    Ok(())
}

#[test]
fn listing_reserialization_is_canonical() -> Result<()> {
    let fixture = Fixture::new()?;
    let source = fixture.new_source(
        "proj",
        &[
            ("z.txt", "zz"),
            ("a.txt", "aa"),
            ("mid/inner.txt", "ii"),
        ],
    )?;
    let (ctx, outcome) = fixture.backup(&source)?;

    // Reading the root listing and re-serializing from parsed entries must
    // produce identical bytes: tag, digest, name, sorted order
    let stored = String::from_utf8(ctx.store.read_bytes(&outcome.root_digest)?)?;
    let root = snapshot::latest(&ctx.snapshots_dir(), ctx.project())?.unwrap();
    let entries = root.top().entries(&ctx.store)?;

    let mut lines: Vec<(u8, String, String)> = Vec::new();
    for (name, entry) in &entries {
        let (rank, tag) = match entry {
            backup_engine::SnapshotEntry::File(_) => (0, 'F'),
            backup_engine::SnapshotEntry::Directory(_) => (1, 'D'),
            backup_engine::SnapshotEntry::Link(_) => (2, 'L'),
        };
        lines.push((rank, entry.digest().to_hex(), format!("{tag} {} {name}", entry.digest())));
    }
    lines.sort();
    let rebuilt: String = lines
        .into_iter()
        .map(|(_, _, line)| format!("{line}\n"))
        .collect();

    assert_eq!(rebuilt, stored);
    Ok(())
}
