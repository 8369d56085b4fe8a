use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::fs::types::Entry;

/// Chunked byte stream used for all file transfers. Drivers produce and
/// consume chunks so a copy never holds a whole file in memory.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Chunk size drivers use when turning a file into a [`ByteStream`].
pub const STREAM_CHUNK_SIZE: usize = 256 * 1024;

/// Backend type information for display and identification
#[derive(Debug, Clone, PartialEq)]
pub enum BackendType {
    Local { root: String },
    S3 { bucket: String, region: String },
    Gcs { bucket: String },
    Memory { label: String },
}

impl BackendType {
    /// Get a short display name for the backend
    pub fn short_name(&self) -> &'static str {
        match self {
            BackendType::Local { .. } => "Local",
            BackendType::S3 { .. } => "S3",
            BackendType::Gcs { .. } => "GCS",
            BackendType::Memory { .. } => "Mem",
        }
    }

    /// Get a display string for the tree this backend fronts
    pub fn display(&self) -> String {
        match self {
            BackendType::Local { root } => root.clone(),
            BackendType::S3 { bucket, region } => format!("s3://{} ({})", bucket, region),
            BackendType::Gcs { bucket } => format!("gs://{}", bucket),
            BackendType::Memory { label } => format!("mem://{}", label),
        }
    }
}

/// Unified storage trait the sync core is generic over. Tree paths are
/// absolute (`/a/b.txt`), normalized per [`crate::fs::types::normalize_path`].
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Check whether a path exists in the tree.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Enumerate every entry reachable under `root`, recursively. A missing
    /// root enumerates as an empty tree; I/O failures are errors.
    async fn list_all(&self, root: &str) -> Result<Vec<Entry>>;

    /// Open a read stream for a file. Fails if the path is absent.
    async fn read_stream(&self, path: &str) -> Result<ByteStream>;

    /// Create or overwrite a file from a stream, creating missing parent
    /// directories. Returns the number of bytes written.
    async fn put_stream(&self, path: &str, stream: ByteStream) -> Result<u64>;

    /// Create a directory (and missing parents). Idempotent.
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// Delete a single file.
    async fn delete_file(&self, path: &str) -> Result<()>;

    /// Delete a directory and everything beneath it.
    async fn delete_dir(&self, path: &str) -> Result<()>;

    /// Get the backend type
    fn backend_type(&self) -> BackendType;
}
