//! Chunked upload coordination for depot.
//!
//! This crate provides:
//! - The session registry and its expiry sweep
//! - Chunk ingestion with per-range reservations for concurrent writers
//! - Commit: whole-file digest verification and artifact publication
//! - The [`ArtifactStore`] abstraction and its object-store implementation
//!
//! [`Uploads`] bundles the pieces behind the operations a transport layer needs.

pub mod artifact;
pub mod chunks;
pub mod commit;
pub mod error;
pub mod registry;

pub use artifact::{ArtifactStore, ObjectArtifactStore};
pub use chunks::{ChunkAck, ChunkStore};
pub use commit::{CommitCoordinator, CommitReceipt};
pub use error::{UploadError, UploadResult};
pub use registry::SessionRegistry;

use bytes::Bytes;
use depot_core::config::UploadConfig;
use depot_core::{ByteRange, ContentHash, UploadId, UploadSession};
use depot_storage::ObjectStore;
use std::sync::Arc;
use time::OffsetDateTime;

/// The upload coordinator.
///
/// Cheap to clone; all clones share the same sessions and storage.
#[derive(Clone)]
pub struct Uploads {
    registry: Arc<SessionRegistry>,
    chunks: Arc<ChunkStore>,
    commits: Arc<CommitCoordinator>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl Uploads {
    /// Build a coordinator keeping chunks and artifacts in the same object store.
    pub fn new(storage: Arc<dyn ObjectStore>, config: &UploadConfig) -> Self {
        let artifacts = Arc::new(ObjectArtifactStore::new(storage.clone()));
        Self::with_artifact_store(storage, artifacts, config)
    }

    /// Build a coordinator with a separate artifact store.
    pub fn with_artifact_store(
        storage: Arc<dyn ObjectStore>,
        artifacts: Arc<dyn ArtifactStore>,
        config: &UploadConfig,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(storage.clone(), config));
        let chunks = Arc::new(ChunkStore::new(
            registry.clone(),
            storage,
            config.max_chunk_size,
        ));
        let commits = Arc::new(CommitCoordinator::new(
            registry.clone(),
            chunks.clone(),
            artifacts.clone(),
            config.commit_timeout(),
        ));
        Self {
            registry,
            chunks,
            commits,
            artifacts,
        }
    }

    /// Open a session for an upload of `declared_size` bytes.
    pub fn create_session(&self, declared_size: u64) -> UploadResult<UploadSession> {
        let id = self.registry.create(declared_size)?;
        self.registry
            .peek(id)
            .ok_or(UploadError::SessionNotFound(id))
    }

    /// Store one chunk.
    pub async fn write_chunk(
        &self,
        upload_id: UploadId,
        range: ByteRange,
        data: Bytes,
        expected_hash: Option<ContentHash>,
    ) -> UploadResult<ChunkAck> {
        self.chunks
            .write(upload_id, range, data, expected_hash)
            .await
    }

    /// Commit a complete session under its expected digest.
    pub async fn commit(
        &self,
        upload_id: UploadId,
        expected: ContentHash,
    ) -> UploadResult<CommitReceipt> {
        self.commits.commit(upload_id, expected).await
    }

    /// Snapshot of a session.
    pub async fn status(&self, upload_id: UploadId) -> UploadResult<UploadSession> {
        self.registry.get(upload_id).await
    }

    /// Abandon a session and release its chunks.
    pub async fn abort(&self, upload_id: UploadId) -> UploadResult<()> {
        self.registry.abort(upload_id).await
    }

    /// Expire every idle session. Returns how many were expired.
    pub async fn sweep_expired(&self) -> usize {
        self.registry.sweep_expired(OffsetDateTime::now_utc()).await
    }

    /// Number of live sessions.
    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}
