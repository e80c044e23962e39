use bytes::Bytes;
use depot_storage::{FilesystemBackend, MemoryBackend, ObjectStore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tempfile::TempDir;

/// Compute SHA-256 hash of data as hex string
pub fn sha256_hash(data: &[u8]) -> String {
    let result = Sha256::digest(data);
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Generate deterministic test data using a seeded pseudo-random generator
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Every backend under test, paired with the temp directory that keeps the
/// filesystem one alive.
pub async fn all_backends() -> (TempDir, Vec<Arc<dyn ObjectStore>>) {
    let temp_dir = TempDir::new().unwrap();
    let filesystem = FilesystemBackend::new(temp_dir.path().join("objects"))
        .await
        .unwrap();
    let backends: Vec<Arc<dyn ObjectStore>> =
        vec![Arc::new(filesystem), Arc::new(MemoryBackend::new())];
    (temp_dir, backends)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hash() {
        assert_eq!(
            sha256_hash(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_seeded_bytes_deterministic() {
        assert_eq!(seeded_bytes(42, 1000), seeded_bytes(42, 1000));
        assert_ne!(seeded_bytes(42, 1000), seeded_bytes(43, 1000));
    }
}
