//! Content hashing for comparison and transfer verification.
//!
//! BLAKE3 hex digests; fast enough to hash while a transfer streams.

use anyhow::Result;
use futures::TryStreamExt;

use crate::fs::StorageBackend;

/// Hash a byte slice to a BLAKE3 hex digest.
pub fn hash_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Hash a backend file by streaming it chunk by chunk.
pub async fn hash_stream(backend: &dyn StorageBackend, path: &str) -> Result<String> {
    let mut stream = backend.read_stream(path).await?;

    let mut hasher = blake3::Hasher::new();
    while let Some(chunk) = stream.try_next().await? {
        hasher.update(&chunk);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryBackend;

    #[test]
    fn test_hash_bytes_is_stable() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
    }

    #[tokio::test]
    async fn test_hash_stream_matches_hash_bytes() {
        let backend = MemoryBackend::new("t");
        backend.put_bytes("/f.bin", &b"streamed content"[..]).await.unwrap();

        let streamed = hash_stream(&backend, "/f.bin").await.unwrap();
        assert_eq!(streamed, hash_bytes(b"streamed content"));
    }
}
