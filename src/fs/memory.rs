use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::fs::backend::{BackendType, ByteStream, StorageBackend, STREAM_CHUNK_SIZE};
use crate::fs::types::{normalize_path, parent_path, Entry, EntryMeta};
use crate::sync::hash::hash_bytes;

#[derive(Clone)]
enum Node {
    File { data: Bytes, modified: DateTime<Utc> },
    Dir,
}

/// In-memory storage tree. Used by tests and quick experiments; entry
/// metadata carries a BLAKE3 checksum so content-based comparison works
/// without touching a real backend.
pub struct MemoryBackend {
    label: String,
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl MemoryBackend {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            nodes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert a file directly, creating parent directories. Test helper.
    pub async fn put_bytes(&self, path: &str, data: impl Into<Bytes>) -> Result<()> {
        let path = normalize_path(path);
        let mut nodes = self.nodes.write().await;
        insert_parents(&mut nodes, &path);
        nodes.insert(
            path,
            Node::File { data: data.into(), modified: Utc::now() },
        );
        Ok(())
    }

    /// Read a whole file back. Test helper.
    pub async fn read_bytes(&self, path: &str) -> Result<Bytes> {
        let path = normalize_path(path);
        let nodes = self.nodes.read().await;
        match nodes.get(&path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Dir) => bail!("Not a file: {}", path),
            None => bail!("Not found: {}", path),
        }
    }
}

fn insert_parents(nodes: &mut BTreeMap<String, Node>, path: &str) {
    let mut current = path.to_string();
    while let Some(parent) = parent_path(&current) {
        if parent == "/" {
            break;
        }
        nodes.entry(parent.to_string()).or_insert(Node::Dir);
        current = parent.to_string();
    }
}

fn is_under(path: &str, root: &str) -> bool {
    root == "/" || path.starts_with(&format!("{}/", root))
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn exists(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path);
        if path == "/" {
            return Ok(true);
        }
        Ok(self.nodes.read().await.contains_key(&path))
    }

    async fn list_all(&self, root: &str) -> Result<Vec<Entry>> {
        let root = normalize_path(root);
        let nodes = self.nodes.read().await;

        let mut entries = Vec::new();
        for (path, node) in nodes.iter() {
            if path == &root || !is_under(path, &root) {
                continue;
            }
            match node {
                Node::Dir => entries.push(Entry::directory(path.clone())),
                Node::File { data, modified } => entries.push(Entry::file(
                    path.clone(),
                    EntryMeta {
                        size: data.len() as u64,
                        modified: Some(*modified),
                        checksum: Some(hash_bytes(data)),
                    },
                )),
            }
        }

        Ok(entries)
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        let data = self.read_bytes(path).await?;

        let chunks: Vec<std::io::Result<Bytes>> = data
            .chunks(STREAM_CHUNK_SIZE)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn put_stream(&self, path: &str, mut stream: ByteStream) -> Result<u64> {
        let path = normalize_path(path);

        let mut data = Vec::new();
        while let Some(chunk) = stream
            .try_next()
            .await
            .with_context(|| format!("Failed reading stream for: {}", path))?
        {
            data.extend_from_slice(&chunk);
        }
        let written = data.len() as u64;

        let mut nodes = self.nodes.write().await;
        insert_parents(&mut nodes, &path);
        nodes.insert(
            path,
            Node::File { data: Bytes::from(data), modified: Utc::now() },
        );

        Ok(written)
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        if path == "/" {
            return Ok(());
        }

        let mut nodes = self.nodes.write().await;
        if let Some(Node::File { .. }) = nodes.get(&path) {
            bail!("Not a directory: {}", path);
        }
        insert_parents(&mut nodes, &path);
        nodes.insert(path, Node::Dir);
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        let mut nodes = self.nodes.write().await;
        match nodes.get(&path) {
            Some(Node::File { .. }) => {
                nodes.remove(&path);
                Ok(())
            }
            Some(Node::Dir) => bail!("Not a file: {}", path),
            None => bail!("Not found: {}", path),
        }
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        let mut nodes = self.nodes.write().await;
        match nodes.get(&path) {
            Some(Node::Dir) => {}
            Some(Node::File { .. }) => bail!("Not a directory: {}", path),
            None => bail!("Not found: {}", path),
        }

        nodes.remove(&path);
        nodes.retain(|p, _| !is_under(p, &path));
        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Memory { label: self.label.clone() }
    }
}
