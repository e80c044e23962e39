use bytes::Bytes;
use depot_core::ContentHash;
use depot_core::config::UploadConfig;
use depot_storage::ObjectStore;
use depot_uploads::Uploads;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// SHA-256 of `data`, computed independently of `depot_core`.
pub fn sha256_digest(data: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    ContentHash::from_bytes(hasher.finalize().into())
}

/// Generate deterministic test data using a seeded pseudo-random generator.
/// Same seed produces same output (reproducible tests).
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Upload limits small enough to exercise in tests.
#[allow(dead_code)]
pub fn test_config() -> UploadConfig {
    UploadConfig {
        session_ttl_secs: 60,
        max_upload_size: 1024 * 1024,
        max_chunk_size: 64 * 1024,
        commit_timeout_secs: 5,
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn test_uploads(storage: Arc<dyn ObjectStore>) -> Uploads {
    Uploads::new(storage, &test_config())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_digest_matches_known_vector() {
        assert_eq!(
            sha256_digest(b"hello world").to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_seeded_bytes_deterministic() {
        assert_eq!(seeded_bytes(42, 1000), seeded_bytes(42, 1000));
        assert_ne!(seeded_bytes(42, 1000), seeded_bytes(43, 1000));
    }
}
