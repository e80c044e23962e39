//! Content-addressed artifact storage.

use crate::error::{UploadError, UploadResult};
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{ArtifactRef, ContentHash};
use depot_storage::{ByteStream, ObjectStore, StorageError};
use futures::StreamExt;
use std::sync::Arc;

/// Durable, content-addressed storage for committed uploads.
///
/// Artifacts are immutable and keyed by their SHA-256 digest. Storing a
/// digest that already exists is a no-op returning the existing reference.
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    /// Store the bytes of `stream` as the artifact `digest`.
    ///
    /// Implementations must verify that the streamed bytes hash to `digest`
    /// and must never expose a partially written artifact.
    async fn store(&self, digest: &ContentHash, stream: ByteStream) -> UploadResult<ArtifactRef>;

    /// Check whether an artifact exists.
    async fn exists(&self, digest: &ContentHash) -> UploadResult<bool>;

    /// Reference to a stored artifact, if present.
    async fn head(&self, digest: &ContentHash) -> UploadResult<Option<ArtifactRef>>;

    /// Stream an artifact's content.
    async fn get_stream(&self, digest: &ContentHash) -> UploadResult<ByteStream>;
}

/// [`ArtifactStore`] on top of an [`ObjectStore`].
pub struct ObjectArtifactStore {
    storage: Arc<dyn ObjectStore>,
}

impl ObjectArtifactStore {
    pub fn new(storage: Arc<dyn ObjectStore>) -> Self {
        Self { storage }
    }

    /// Read a whole artifact into memory.
    pub async fn get(&self, digest: &ContentHash) -> UploadResult<Bytes> {
        Ok(self.storage.get(&digest.to_artifact_key()).await?)
    }
}

#[async_trait]
impl ArtifactStore for ObjectArtifactStore {
    async fn store(&self, digest: &ContentHash, stream: ByteStream) -> UploadResult<ArtifactRef> {
        if let Some(existing) = self.head(digest).await? {
            tracing::debug!(digest = %digest, "Artifact already stored");
            return Ok(existing);
        }

        let key = digest.to_artifact_key();
        let mut upload = self.storage.put_stream(&key).await?;
        let mut hasher = ContentHash::hasher();
        let mut stream = stream;

        while let Some(next) = stream.next().await {
            let written = match next {
                Ok(bytes) => {
                    hasher.update(&bytes);
                    upload.write(bytes).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                if let Err(abort_err) = upload.abort().await {
                    tracing::warn!(key = %key, error = %abort_err, "Failed to abort artifact upload");
                }
                return Err(e.into());
            }
        }

        let size = hasher.bytes_hashed();
        let actual = hasher.finalize();
        if actual != *digest {
            if let Err(abort_err) = upload.abort().await {
                tracing::warn!(key = %key, error = %abort_err, "Failed to abort artifact upload");
            }
            return Err(UploadError::DigestMismatch {
                expected: digest.to_hex(),
                actual: actual.to_hex(),
            });
        }

        upload.finish().await?;
        tracing::info!(digest = %digest, size, "Artifact stored");
        Ok(ArtifactRef::new(*digest, size))
    }

    async fn exists(&self, digest: &ContentHash) -> UploadResult<bool> {
        Ok(self.storage.exists(&digest.to_artifact_key()).await?)
    }

    async fn head(&self, digest: &ContentHash) -> UploadResult<Option<ArtifactRef>> {
        match self.storage.head(&digest.to_artifact_key()).await {
            Ok(meta) => Ok(Some(ArtifactRef::new(*digest, meta.size))),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_stream(&self, digest: &ContentHash) -> UploadResult<ByteStream> {
        Ok(self.storage.get_stream(&digest.to_artifact_key()).await?)
    }
}
