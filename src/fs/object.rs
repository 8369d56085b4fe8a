use std::time::SystemTime;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use opendal::services::{Gcs, S3};
use opendal::Operator;

use crate::fs::backend::{BackendType, ByteStream, StorageBackend, STREAM_CHUNK_SIZE};
use crate::fs::types::{normalize_path, Entry, EntryMeta};

/// Object storage backend (S3-compatible or GCS) through a single OpenDAL
/// operator. Object stores have no real directories; markers are zero-byte
/// objects with a trailing slash.
pub struct ObjectBackend {
    op: Operator,
    kind: BackendType,
}

/// Map a tree path to an object key (no leading slash, `""` for the root).
fn object_key(path: &str) -> String {
    normalize_path(path).trim_start_matches('/').to_string()
}

fn dir_key(path: &str) -> String {
    let key = object_key(path);
    if key.is_empty() {
        key
    } else {
        format!("{}/", key)
    }
}

impl ObjectBackend {
    /// S3 or S3-compatible bucket. Credentials fall back to the standard
    /// provider chain when not given explicitly.
    pub fn s3(
        bucket: &str,
        region: &str,
        endpoint: Option<&str>,
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<Self> {
        let mut builder = S3::default().bucket(bucket).region(region);

        if let Some(endpoint) = endpoint {
            builder = builder.endpoint(endpoint);
        }
        if let (Some(ak), Some(sk)) = (access_key, secret_key) {
            builder = builder.access_key_id(ak).secret_access_key(sk);
        }

        let op = Operator::new(builder)
            .context("Failed to configure S3 backend")?
            .finish();

        Ok(Self {
            op,
            kind: BackendType::S3 {
                bucket: bucket.to_string(),
                region: region.to_string(),
            },
        })
    }

    /// GCS bucket using ambient application credentials.
    pub fn gcs(bucket: &str) -> Result<Self> {
        let builder = Gcs::default().bucket(bucket);

        let op = Operator::new(builder)
            .context("Failed to configure GCS backend")?
            .finish();

        Ok(Self {
            op,
            kind: BackendType::Gcs { bucket: bucket.to_string() },
        })
    }
}

#[async_trait]
impl StorageBackend for ObjectBackend {
    async fn exists(&self, path: &str) -> Result<bool> {
        let key = object_key(path);
        if key.is_empty() {
            return Ok(true);
        }

        if self.op.exists(&key).await.context("Failed to check object")? {
            return Ok(true);
        }
        // A directory marker carries a trailing slash.
        self.op
            .exists(&format!("{}/", key))
            .await
            .context("Failed to check directory marker")
    }

    async fn list_all(&self, root: &str) -> Result<Vec<Entry>> {
        let prefix = dir_key(root);

        let listing = self
            .op
            .list_with(&prefix)
            .recursive(true)
            .await
            .context("Failed to list object storage")?;

        let mut entries = Vec::new();
        for item in listing {
            let raw = item.path();
            if raw.is_empty() || raw == prefix {
                continue;
            }

            let tree_path = format!("/{}", raw.trim_end_matches('/'));
            let meta = item.metadata();

            if meta.mode().is_dir() {
                entries.push(Entry::directory(tree_path));
            } else {
                entries.push(Entry::file(
                    tree_path,
                    EntryMeta {
                        size: meta.content_length(),
                        modified: meta
                            .last_modified()
                            .map(|t| DateTime::<Utc>::from(SystemTime::from(t))),
                        checksum: None,
                    },
                ));
            }
        }

        Ok(entries)
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        let key = object_key(path);

        let meta = self
            .op
            .stat(&key)
            .await
            .with_context(|| format!("Failed to stat object: {}", key))?;
        let size = meta.content_length();

        let reader = self
            .op
            .reader(&key)
            .await
            .with_context(|| format!("Failed to open object: {}", key))?;

        let stream = futures::stream::try_unfold((reader, 0u64), move |(reader, pos)| async move {
            if pos >= size {
                return Ok(None);
            }
            let end = (pos + STREAM_CHUNK_SIZE as u64).min(size);
            let buffer = reader
                .read(pos..end)
                .await
                .map_err(std::io::Error::other)?;
            Ok(Some((buffer.to_bytes(), (reader, end))))
        })
        .boxed();

        Ok(stream)
    }

    async fn put_stream(&self, path: &str, mut stream: ByteStream) -> Result<u64> {
        let key = object_key(path);

        let mut writer = self
            .op
            .writer(&key)
            .await
            .with_context(|| format!("Failed to open object writer: {}", key))?;

        let mut written = 0u64;
        while let Some(chunk) = stream
            .try_next()
            .await
            .with_context(|| format!("Failed reading stream for: {}", key))?
        {
            written += chunk.len() as u64;
            writer
                .write(chunk)
                .await
                .with_context(|| format!("Failed to write object: {}", key))?;
        }
        writer
            .close()
            .await
            .with_context(|| format!("Failed to finish object: {}", key))?;

        Ok(written)
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let key = dir_key(path);
        if key.is_empty() {
            return Ok(());
        }
        self.op
            .create_dir(&key)
            .await
            .with_context(|| format!("Failed to create directory marker: {}", key))?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let key = object_key(path);
        self.op
            .delete(&key)
            .await
            .with_context(|| format!("Failed to delete object: {}", key))?;
        Ok(())
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        let key = dir_key(path);
        self.op
            .remove_all(&key)
            .await
            .with_context(|| format!("Failed to delete directory: {}", key))?;
        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        self.kind.clone()
    }
}
