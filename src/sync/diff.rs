//! Tree comparison.
//!
//! Classifies every entry discovered under the scope root into the three
//! transfer sets: present on master only (write), present on both but
//! differing (update), present on slave only (delete). Exclusion happens
//! here, once; the transfer layer never re-checks scope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fs::{Entry, StorageBackend};
use crate::sync::error::{Result, SyncError, TreeSide};
use crate::sync::scope::WorkingScope;

/// Comparator deciding whether an entry present on both trees needs an
/// update. Pluggable; every policy treats a kind mismatch (file on one
/// side, directory on the other) as differing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparePolicy {
    /// Sizes differ.
    Size,
    /// Sizes differ, or the master copy is newer.
    #[default]
    SizeAndMtime,
    /// Content checksums differ; falls back to size/mtime when either side
    /// has no checksum.
    Checksum,
}

impl ComparePolicy {
    fn size_and_mtime(master: &Entry, slave: &Entry) -> bool {
        if master.meta.size != slave.meta.size {
            return true;
        }
        match (&master.meta.modified, &slave.meta.modified) {
            (Some(m), Some(s)) => m > s,
            _ => false,
        }
    }

    pub fn differs(&self, master: &Entry, slave: &Entry) -> bool {
        if master.kind != slave.kind {
            return true;
        }
        if master.is_dir() {
            return false;
        }

        match self {
            ComparePolicy::Size => master.meta.size != slave.meta.size,
            ComparePolicy::SizeAndMtime => Self::size_and_mtime(master, slave),
            ComparePolicy::Checksum => {
                match (&master.meta.checksum, &slave.meta.checksum) {
                    (Some(m), Some(s)) => m != s,
                    _ => Self::size_and_mtime(master, slave),
                }
            }
        }
    }
}

/// The classified result of one diff call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeSet {
    /// On master, absent on slave. Parents before children.
    pub writes: Vec<Entry>,
    /// On both, differing. Parents before children.
    pub updates: Vec<Entry>,
    /// On slave, absent on master. Children before parents, so a directory
    /// is never removed while it still holds undeleted members.
    pub deletes: Vec<Entry>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn total(&self) -> usize {
        self.writes.len() + self.updates.len() + self.deletes.len()
    }
}

/// Sort entries so every directory precedes its descendants. A parent path
/// is a strict prefix of its children, so lexicographic order suffices.
pub fn order_parents_first(entries: &mut [Entry]) {
    entries.sort_by(|a, b| a.path.cmp(&b.path));
}

/// Sort entries so every directory follows its descendants.
pub fn order_children_first(entries: &mut [Entry]) {
    entries.sort_by(|a, b| b.path.cmp(&a.path));
}

/// Compares two storage trees under a scope. Holds no state across calls
/// beyond the comparator choice.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine {
    policy: ComparePolicy,
}

impl DiffEngine {
    pub fn new(policy: ComparePolicy) -> Self {
        Self { policy }
    }

    /// Enumerate both trees under `scope.root()` and classify. Enumeration
    /// failure on either side is fatal; no partial ChangeSet is returned.
    pub async fn diff(
        &self,
        master: &dyn StorageBackend,
        slave: &dyn StorageBackend,
        scope: &WorkingScope,
    ) -> Result<ChangeSet> {
        let root = scope.root();

        let master_entries =
            master
                .list_all(root)
                .await
                .map_err(|source| SyncError::Enumeration {
                    tree: TreeSide::Master,
                    root: root.to_string(),
                    source: source.into(),
                })?;
        let slave_entries =
            slave
                .list_all(root)
                .await
                .map_err(|source| SyncError::Enumeration {
                    tree: TreeSide::Slave,
                    root: root.to_string(),
                    source: source.into(),
                })?;

        let master_map: BTreeMap<&str, &Entry> = master_entries
            .iter()
            .map(|e| (e.path.as_str(), e))
            .collect();
        let slave_map: BTreeMap<&str, &Entry> = slave_entries
            .iter()
            .map(|e| (e.path.as_str(), e))
            .collect();

        let mut changes = ChangeSet::default();

        for entry in &master_entries {
            if scope.is_excluded(&entry.path) {
                debug!(path = %entry.path, "excluded from diff");
                continue;
            }
            match slave_map.get(entry.path.as_str()) {
                None => changes.writes.push(entry.clone()),
                Some(slave_entry) => {
                    if self.policy.differs(entry, slave_entry) {
                        changes.updates.push(entry.clone());
                    }
                }
            }
        }

        for entry in &slave_entries {
            if scope.is_excluded(&entry.path) {
                continue;
            }
            if !master_map.contains_key(entry.path.as_str()) {
                changes.deletes.push(entry.clone());
            }
        }

        order_parents_first(&mut changes.writes);
        order_parents_first(&mut changes.updates);
        order_children_first(&mut changes.deletes);

        debug!(
            root = %root,
            writes = changes.writes.len(),
            updates = changes.updates.len(),
            deletes = changes.deletes.len(),
            "diff complete"
        );

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::types::EntryMeta;
    use crate::fs::MemoryBackend;
    use chrono::{TimeZone, Utc};

    fn file(path: &str, size: u64, mtime: Option<i64>) -> Entry {
        Entry::file(
            path,
            EntryMeta {
                size,
                modified: mtime.map(|t| Utc.timestamp_opt(t, 0).unwrap()),
                checksum: None,
            },
        )
    }

    #[test]
    fn test_policy_size() {
        let policy = ComparePolicy::Size;
        assert!(policy.differs(&file("/f", 10, None), &file("/f", 11, None)));
        assert!(!policy.differs(&file("/f", 10, None), &file("/f", 10, None)));
    }

    #[test]
    fn test_policy_newer_master_wins() {
        let policy = ComparePolicy::SizeAndMtime;
        // Same size, master newer: update.
        assert!(policy.differs(&file("/f", 10, Some(200)), &file("/f", 10, Some(100))));
        // Same size, slave newer: leave it.
        assert!(!policy.differs(&file("/f", 10, Some(100)), &file("/f", 10, Some(200))));
        // Missing timestamps: no update.
        assert!(!policy.differs(&file("/f", 10, None), &file("/f", 10, Some(100))));
    }

    #[test]
    fn test_policy_kind_mismatch_differs() {
        let policy = ComparePolicy::SizeAndMtime;
        let dir = Entry::directory("/p");
        assert!(policy.differs(&file("/p", 0, None), &dir));
        assert!(!policy.differs(&dir, &Entry::directory("/p")));
    }

    #[test]
    fn test_policy_checksum() {
        let policy = ComparePolicy::Checksum;
        let mut a = file("/f", 10, None);
        let mut b = file("/f", 10, None);
        a.meta.checksum = Some("aa".into());
        b.meta.checksum = Some("bb".into());
        assert!(policy.differs(&a, &b));

        b.meta.checksum = Some("aa".into());
        assert!(!policy.differs(&a, &b));

        // One side without a checksum falls back to size/mtime.
        b.meta.checksum = None;
        assert!(!policy.differs(&a, &b));
    }

    #[tokio::test]
    async fn test_classification() {
        let master = MemoryBackend::new("master");
        let slave = MemoryBackend::new("slave");

        master.put_bytes("/both-same.txt", &b"same"[..]).await.unwrap();
        slave.put_bytes("/both-same.txt", &b"same"[..]).await.unwrap();

        master.put_bytes("/differs.txt", &b"longer on master"[..]).await.unwrap();
        slave.put_bytes("/differs.txt", &b"short"[..]).await.unwrap();

        master.put_bytes("/only-master.txt", &b"m"[..]).await.unwrap();
        slave.put_bytes("/only-slave.txt", &b"s"[..]).await.unwrap();

        let engine = DiffEngine::new(ComparePolicy::Size);
        let scope = WorkingScope::new("/");
        let changes = engine.diff(&master, &slave, &scope).await.unwrap();

        let writes: Vec<&str> = changes.writes.iter().map(|e| e.path.as_str()).collect();
        let updates: Vec<&str> = changes.updates.iter().map(|e| e.path.as_str()).collect();
        let deletes: Vec<&str> = changes.deletes.iter().map(|e| e.path.as_str()).collect();

        assert_eq!(writes, vec!["/only-master.txt"]);
        assert_eq!(updates, vec!["/differs.txt"]);
        assert_eq!(deletes, vec!["/only-slave.txt"]);
    }

    #[tokio::test]
    async fn test_ordering_invariants() {
        let master = MemoryBackend::new("master");
        let slave = MemoryBackend::new("slave");

        master.put_bytes("/d/sub/deep.txt", &b"x"[..]).await.unwrap();
        master.put_bytes("/d/file.txt", &b"x"[..]).await.unwrap();
        slave.put_bytes("/gone/sub/deep.txt", &b"x"[..]).await.unwrap();

        let engine = DiffEngine::default();
        let scope = WorkingScope::new("/");
        let changes = engine.diff(&master, &slave, &scope).await.unwrap();

        let writes: Vec<&str> = changes.writes.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(writes, vec!["/d", "/d/file.txt", "/d/sub", "/d/sub/deep.txt"]);

        let deletes: Vec<&str> = changes.deletes.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(deletes, vec!["/gone/sub/deep.txt", "/gone/sub", "/gone"]);
    }

    #[tokio::test]
    async fn test_excluded_paths_never_classified() {
        let master = MemoryBackend::new("master");
        let slave = MemoryBackend::new("slave");

        master.put_bytes("/keep.txt", &b"k"[..]).await.unwrap();
        master.put_bytes("/skip/master-only.txt", &b"m"[..]).await.unwrap();
        slave.put_bytes("/skip/slave-only.txt", &b"s"[..]).await.unwrap();

        let engine = DiffEngine::default();
        let scope = WorkingScope::new("/").with_exclude("/skip").unwrap();
        let changes = engine.diff(&master, &slave, &scope).await.unwrap();

        for entry in changes
            .writes
            .iter()
            .chain(&changes.updates)
            .chain(&changes.deletes)
        {
            assert!(!entry.path.starts_with("/skip"), "leaked: {}", entry.path);
        }
        assert_eq!(changes.writes.len(), 1);
        assert!(changes.deletes.is_empty());
    }

    #[tokio::test]
    async fn test_directories_on_both_sides_never_update() {
        let master = MemoryBackend::new("master");
        let slave = MemoryBackend::new("slave");

        master.put_bytes("/d/a.txt", &b"a"[..]).await.unwrap();
        slave.put_bytes("/d/a.txt", &b"a"[..]).await.unwrap();

        let engine = DiffEngine::new(ComparePolicy::Checksum);
        let changes = engine
            .diff(&master, &slave, &WorkingScope::new("/"))
            .await
            .unwrap();

        assert!(changes.is_empty(), "unexpected changes: {:?}", changes);
    }

    #[test]
    fn test_delete_ordering_helper() {
        let mut entries = vec![
            Entry::directory("/a"),
            Entry::file("/a/b.txt", EntryMeta::default()),
            Entry::directory("/a/c"),
        ];
        order_children_first(&mut entries);
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a/c", "/a/b.txt", "/a"]);
    }
}
