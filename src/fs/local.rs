use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::fs::backend::{BackendType, ByteStream, StorageBackend, STREAM_CHUNK_SIZE};
use crate::fs::types::{Entry, EntryMeta};

/// Local filesystem backend rooted at a directory. Tree paths map below the
/// root; `/a/b.txt` lives at `<root>/a/b.txt`.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn file_stream(file: tokio::fs::File) -> ByteStream {
    futures::stream::try_unfold(file, |mut file| async move {
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        let n = file.read(&mut buf).await?;
        if n == 0 {
            Ok(None)
        } else {
            buf.truncate(n);
            Ok(Some((Bytes::from(buf), file)))
        }
    })
    .boxed()
}

/// Walk the tree below `base` and map each node to a tree-path entry.
/// Runs on a blocking thread; jwalk parallelizes the directory reads.
fn walk_tree(base: PathBuf, root: PathBuf) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();

    for item in jwalk::WalkDir::new(&base)
        .min_depth(1)
        .skip_hidden(false)
        .sort(true)
    {
        let item = item.with_context(|| format!("Failed to walk: {}", base.display()))?;
        let path = item.path();

        let relative = path
            .strip_prefix(&root)
            .with_context(|| format!("Walked outside the tree root: {}", path.display()))?;
        let tree_path = format!("/{}", relative.to_string_lossy().replace('\\', "/"));

        if item.file_type().is_dir() {
            entries.push(Entry::directory(tree_path));
        } else {
            let metadata = std::fs::metadata(&path)
                .with_context(|| format!("Failed to stat: {}", path.display()))?;
            let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

            entries.push(Entry::file(
                tree_path,
                EntryMeta {
                    size: metadata.len(),
                    modified,
                    checksum: None,
                },
            ));
        }
    }

    Ok(entries)
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.full_path(path);
        Ok(tokio::fs::try_exists(&full).await?)
    }

    async fn list_all(&self, root: &str) -> Result<Vec<Entry>> {
        let base = self.full_path(root);
        if !tokio::fs::try_exists(&base).await? {
            return Ok(Vec::new());
        }

        let tree_root = self.root.clone();
        tokio::task::spawn_blocking(move || walk_tree(base, tree_root))
            .await
            .context("Enumeration task failed")?
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        let full = self.full_path(path);
        let file = tokio::fs::File::open(&full)
            .await
            .with_context(|| format!("Failed to open local file: {}", full.display()))?;
        Ok(file_stream(file))
    }

    async fn put_stream(&self, path: &str, mut stream: ByteStream) -> Result<u64> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = tokio::fs::File::create(&full)
            .await
            .with_context(|| format!("Failed to create local file: {}", full.display()))?;

        let mut written = 0u64;
        while let Some(chunk) = stream
            .try_next()
            .await
            .with_context(|| format!("Failed reading stream for: {}", full.display()))?
        {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write local file: {}", full.display()))?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        tokio::fs::create_dir_all(&full)
            .await
            .with_context(|| format!("Failed to create directory: {}", full.display()))?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        tokio::fs::remove_file(&full)
            .await
            .with_context(|| format!("Failed to delete file: {}", full.display()))?;
        Ok(())
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        tokio::fs::remove_dir_all(&full)
            .await
            .with_context(|| format!("Failed to delete directory: {}", full.display()))?;
        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Local {
            root: self.root.to_string_lossy().to_string(),
        }
    }
}

impl LocalBackend {
    /// Root directory this backend fronts.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
