mod common;

use std::sync::Arc;

use treesync::fs::LocalBackend;
use treesync::sync::SyncEngine;

fn local_engine(master: &std::path::Path, slave: &std::path::Path) -> SyncEngine {
    SyncEngine::new(
        Arc::new(LocalBackend::new(master)),
        Arc::new(LocalBackend::new(slave)),
        common::unlimited_options(),
    )
}

#[tokio::test]
async fn test_local_sync_restore_roundtrip() {
    let master_dir = tempfile::tempdir().unwrap();
    let slave_dir = tempfile::tempdir().unwrap();

    std::fs::create_dir_all(master_dir.path().join("docs")).unwrap();
    std::fs::write(master_dir.path().join("docs/a.txt"), b"alpha").unwrap();
    std::fs::write(master_dir.path().join("top.txt"), b"top").unwrap();

    std::fs::create_dir_all(slave_dir.path().join("old")).unwrap();
    std::fs::write(slave_dir.path().join("old/k.txt"), b"keep").unwrap();

    let mut engine = local_engine(master_dir.path(), slave_dir.path());

    let report = engine.sync(None).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(
        std::fs::read(slave_dir.path().join("docs/a.txt")).unwrap(),
        b"alpha"
    );
    assert_eq!(std::fs::read(slave_dir.path().join("top.txt")).unwrap(), b"top");
    // Sync never deletes slave-only entries.
    assert!(slave_dir.path().join("old/k.txt").exists());

    let second = engine.sync(None).await.unwrap();
    assert_eq!(second.writes.attempted, 0);
    assert_eq!(second.updates.attempted, 0);

    // Restore pulls the slave-only subtree back.
    let restored = engine.restore(None).await.unwrap();
    assert!(restored.is_clean());
    assert_eq!(
        std::fs::read(master_dir.path().join("old/k.txt")).unwrap(),
        b"keep"
    );
}

#[tokio::test]
async fn test_local_update_propagates() {
    let master_dir = tempfile::tempdir().unwrap();
    let slave_dir = tempfile::tempdir().unwrap();

    std::fs::write(master_dir.path().join("f.txt"), b"one").unwrap();

    let mut engine = local_engine(master_dir.path(), slave_dir.path());
    engine.sync(None).await.unwrap();
    assert_eq!(std::fs::read(slave_dir.path().join("f.txt")).unwrap(), b"one");

    std::fs::write(master_dir.path().join("f.txt"), b"number two").unwrap();

    let report = engine.sync(None).await.unwrap();
    assert_eq!(report.updates.succeeded, 1);
    assert_eq!(
        std::fs::read(slave_dir.path().join("f.txt")).unwrap(),
        b"number two"
    );
}

#[tokio::test]
async fn test_local_scoped_sync_leaves_siblings_alone() {
    let master_dir = tempfile::tempdir().unwrap();
    let slave_dir = tempfile::tempdir().unwrap();

    std::fs::create_dir_all(master_dir.path().join("in")).unwrap();
    std::fs::create_dir_all(master_dir.path().join("out")).unwrap();
    std::fs::write(master_dir.path().join("in/wanted.txt"), b"w").unwrap();
    std::fs::write(master_dir.path().join("out/ignored.txt"), b"i").unwrap();

    let mut engine = local_engine(master_dir.path(), slave_dir.path());
    let report = engine.sync(Some("/in")).await.unwrap();

    assert!(report.is_clean());
    assert!(slave_dir.path().join("in/wanted.txt").exists());
    assert!(!slave_dir.path().join("out").exists());
}
