#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use treesync::fs::{BackendType, ByteStream, Entry, MemoryBackend, StorageBackend};
use treesync::sync::{RateLimit, SyncEngine, SyncOptions, Throttle};

pub fn unlimited_options() -> SyncOptions {
    SyncOptions {
        rate: RateLimit::unlimited(),
        ..Default::default()
    }
}

pub fn engine(master: Arc<MemoryBackend>, slave: Arc<MemoryBackend>) -> SyncEngine {
    SyncEngine::new(master, slave, unlimited_options())
}

/// All paths under the tree root, sorted.
pub async fn tree_paths(backend: &dyn StorageBackend) -> Vec<String> {
    let mut paths: Vec<String> = backend
        .list_all("/")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.path)
        .collect();
    paths.sort();
    paths
}

/// Wrapper that injects failures: marked paths fail their read/write, and
/// enumeration can be made to fail outright.
pub struct FlakyBackend {
    inner: Arc<dyn StorageBackend>,
    fail_paths: HashSet<String>,
    fail_enumeration: bool,
}

impl FlakyBackend {
    pub fn new(inner: Arc<dyn StorageBackend>) -> Self {
        Self {
            inner,
            fail_paths: HashSet::new(),
            fail_enumeration: false,
        }
    }

    pub fn fail_path(mut self, path: &str) -> Self {
        self.fail_paths.insert(path.to_string());
        self
    }

    pub fn fail_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    fn check(&self, path: &str) -> Result<()> {
        if self.fail_paths.contains(path) {
            bail!("injected failure: {}", path);
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn list_all(&self, root: &str) -> Result<Vec<Entry>> {
        if self.fail_enumeration {
            bail!("injected enumeration failure under {}", root);
        }
        self.inner.list_all(root).await
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        self.check(path)?;
        self.inner.read_stream(path).await
    }

    async fn put_stream(&self, path: &str, stream: ByteStream) -> Result<u64> {
        self.check(path)?;
        self.inner.put_stream(path, stream).await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.check(path)?;
        self.inner.create_dir(path).await
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        self.check(path)?;
        self.inner.delete_file(path).await
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        self.check(path)?;
        self.inner.delete_dir(path).await
    }

    fn backend_type(&self) -> BackendType {
        self.inner.backend_type()
    }
}

/// Throttle that counts admissions instead of pacing them.
#[derive(Default)]
pub struct CountingThrottle {
    pub admitted: AtomicUsize,
}

#[async_trait]
impl Throttle for CountingThrottle {
    async fn admit(&self) {
        self.admitted.fetch_add(1, Ordering::SeqCst);
    }
}
