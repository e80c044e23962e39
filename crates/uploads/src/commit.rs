//! Commit: assemble a complete session, verify its digest and publish it.

use crate::artifact::ArtifactStore;
use crate::chunks::ChunkStore;
use crate::error::{UploadError, UploadResult};
use crate::registry::{SessionRegistry, SessionSlot, lock};
use depot_core::{ArtifactRef, ContentHash, ReceivedChunk, UploadId, UploadState};
use depot_storage::StorageError;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Outcome of a successful commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReceipt {
    pub artifact: ArtifactRef,
    /// The artifact already existed and storing it was skipped.
    pub deduplicated: bool,
    pub duration: Duration,
}

/// Turns complete sessions into artifacts.
pub struct CommitCoordinator {
    registry: Arc<SessionRegistry>,
    chunks: Arc<ChunkStore>,
    artifacts: Arc<dyn ArtifactStore>,
    timeout: Duration,
}

impl CommitCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        chunks: Arc<ChunkStore>,
        artifacts: Arc<dyn ArtifactStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            chunks,
            artifacts,
            timeout,
        }
    }

    /// Commit a session whose bytes must hash to `expected`.
    ///
    /// The session is held in `Committing` for the duration, which blocks
    /// chunk writes and concurrent commits. Any failure (including timeout or
    /// the caller dropping the future) returns it to `Open` with its chunks
    /// intact, so the client can retry. On success the session is removed and
    /// its chunk storage released.
    #[tracing::instrument(skip(self, expected), fields(expected = %expected))]
    pub async fn commit(
        &self,
        upload_id: UploadId,
        expected: ContentHash,
    ) -> UploadResult<CommitReceipt> {
        let started = Instant::now();
        let slot = self.registry.slot(upload_id).await?;

        let (declared_size, chunks) = {
            let mut session = lock(&slot);
            match session.state {
                UploadState::Open => {}
                UploadState::Committing => return Err(UploadError::CommitInProgress(upload_id)),
                UploadState::Committed | UploadState::Expired => {
                    return Err(UploadError::SessionNotFound(upload_id));
                }
            }
            if !session.is_complete() {
                return Err(UploadError::IncompleteUpload {
                    missing_bytes: session.missing_bytes(),
                });
            }
            session.state = UploadState::Committing;
            session.expected_digest = Some(expected);
            session.touch(OffsetDateTime::now_utc(), self.registry.ttl());
            (session.declared_size, session.ordered_chunks())
        };
        let guard = CommitGuard::new(slot);

        let outcome = tokio::time::timeout(
            self.timeout,
            self.assemble(upload_id, declared_size, chunks, &expected),
        )
        .await
        .unwrap_or(Err(UploadError::Timeout(self.timeout)));

        let (artifact, deduplicated) = match outcome {
            Ok(stored) => stored,
            Err(e) => {
                let state = guard.revert();
                tracing::warn!(upload_id = %upload_id, error = %e, "Commit failed");
                if state == UploadState::Expired {
                    return Err(UploadError::SessionNotFound(upload_id));
                }
                return Err(e);
            }
        };

        guard.complete();
        self.registry.remove(upload_id);
        if let Err(e) = self.chunks.purge(upload_id).await {
            tracing::warn!(
                upload_id = %upload_id,
                error = %e,
                "Failed to release chunks of committed upload"
            );
        }

        let duration = started.elapsed();
        tracing::info!(
            upload_id = %upload_id,
            digest = %artifact.digest,
            size = artifact.size,
            deduplicated,
            duration_ms = duration.as_millis() as u64,
            "Upload committed"
        );
        Ok(CommitReceipt {
            artifact,
            deduplicated,
            duration,
        })
    }

    /// Verify the session's bytes against `expected` and make sure the
    /// artifact exists.
    ///
    /// When the artifact is already stored the chunks are only hashed.
    /// Otherwise they are streamed into the artifact store, which verifies
    /// the digest as it writes and publishes nothing on mismatch.
    async fn assemble(
        &self,
        upload_id: UploadId,
        declared_size: u64,
        chunks: Vec<ReceivedChunk>,
        expected: &ContentHash,
    ) -> UploadResult<(ArtifactRef, bool)> {
        if let Some(existing) = self.artifacts.head(expected).await? {
            self.verify(upload_id, declared_size, chunks, expected).await?;
            return Ok((existing, true));
        }

        let artifact = self
            .artifacts
            .store(expected, self.chunks.stream(upload_id, chunks))
            .await?;
        if artifact.size != declared_size {
            return Err(StorageError::InvalidRange(format!(
                "assembled {} bytes, session declared {declared_size}",
                artifact.size
            ))
            .into());
        }
        Ok((artifact, false))
    }

    async fn verify(
        &self,
        upload_id: UploadId,
        declared_size: u64,
        chunks: Vec<ReceivedChunk>,
        expected: &ContentHash,
    ) -> UploadResult<()> {
        let mut hasher = ContentHash::hasher();
        let mut stream = self.chunks.stream(upload_id, chunks);
        while let Some(bytes) = stream.next().await {
            hasher.update(&bytes?);
        }

        let assembled = hasher.bytes_hashed();
        if assembled != declared_size {
            return Err(StorageError::InvalidRange(format!(
                "assembled {assembled} bytes, session declared {declared_size}"
            ))
            .into());
        }

        let actual = hasher.finalize();
        if actual != *expected {
            return Err(UploadError::DigestMismatch {
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }
}

/// Holds a session in `Committing`; reverts it to `Open` unless completed.
struct CommitGuard {
    slot: Option<SessionSlot>,
}

impl CommitGuard {
    fn new(slot: SessionSlot) -> Self {
        Self { slot: Some(slot) }
    }

    /// Return the session to `Open` and report the state it was found in.
    fn revert(mut self) -> UploadState {
        match self.slot.take() {
            Some(slot) => Self::reopen(&slot),
            None => UploadState::Open,
        }
    }

    /// Mark the session committed.
    fn complete(mut self) {
        if let Some(slot) = self.slot.take() {
            let mut session = lock(&slot);
            if session.state == UploadState::Committing {
                session.state = UploadState::Committed;
            }
        }
    }

    fn reopen(slot: &SessionSlot) -> UploadState {
        let mut session = lock(slot);
        let found = session.state;
        if found == UploadState::Committing {
            session.state = UploadState::Open;
        }
        found
    }
}

impl Drop for CommitGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            Self::reopen(&slot);
        }
    }
}
