//! Content-addressed artifact references.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};

/// Reference to an immutable artifact stored under its content digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactRef {
    /// SHA-256 of the artifact bytes.
    pub digest: ContentHash,
    /// Artifact size in bytes.
    pub size: u64,
    /// Object store key holding the artifact.
    pub key: String,
}

impl ArtifactRef {
    /// Build the reference for an artifact with `digest` and `size`.
    pub fn new(digest: ContentHash, size: u64) -> Self {
        Self {
            key: digest.to_artifact_key(),
            digest,
            size,
        }
    }

    pub fn to_response(&self) -> ArtifactResponse {
        ArtifactResponse {
            digest: self.digest.to_hex(),
            size: self.size,
        }
    }
}

/// Wire view of a committed artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactResponse {
    /// Hex-encoded SHA-256 digest.
    pub digest: String,
    pub size: u64,
}
