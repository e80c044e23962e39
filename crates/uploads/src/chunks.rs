//! Chunk ingestion and chunk object storage.

use crate::error::{UploadError, UploadResult};
use crate::registry::{SessionRegistry, SessionSlot, lock};
use bytes::Bytes;
use depot_core::{ByteRange, ContentHash, ReceivedChunk, UploadId, UploadState};
use depot_storage::{ByteStream, ObjectStore, StorageError, StorageResult};
use futures::StreamExt;
use std::sync::Arc;
use time::OffsetDateTime;

/// Result of an accepted chunk write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkAck {
    pub upload_id: UploadId,
    pub range: ByteRange,
    /// Bytes received by the session after this write.
    pub bytes_received: u64,
    pub declared_size: u64,
    /// Whether the session now covers its whole declared size.
    pub complete: bool,
    /// The write repeated an identical, already stored chunk.
    pub duplicate: bool,
}

/// Validates, reserves and stores chunks for upload sessions.
pub struct ChunkStore {
    registry: Arc<SessionRegistry>,
    storage: Arc<dyn ObjectStore>,
    max_chunk_size: u64,
}

impl ChunkStore {
    pub fn new(
        registry: Arc<SessionRegistry>,
        storage: Arc<dyn ObjectStore>,
        max_chunk_size: u64,
    ) -> Self {
        Self {
            registry,
            storage,
            max_chunk_size,
        }
    }

    /// Store one chunk of a session.
    ///
    /// The range is reserved before the bytes are written so concurrent
    /// writers to the same session can proceed in parallel without ever
    /// accepting overlapping data. A byte-identical retransmission of an
    /// already stored range succeeds without writing anything.
    #[tracing::instrument(skip(self, range, data, expected_hash), fields(range = %range, len = data.len()))]
    pub async fn write(
        &self,
        upload_id: UploadId,
        range: ByteRange,
        data: Bytes,
        expected_hash: Option<ContentHash>,
    ) -> UploadResult<ChunkAck> {
        if range.len() > self.max_chunk_size {
            return Err(UploadError::InvalidRange(format!(
                "chunk of {} bytes exceeds maximum of {}",
                range.len(),
                self.max_chunk_size
            )));
        }
        if data.len() as u64 != range.len() {
            return Err(UploadError::InvalidRange(format!(
                "range {range} is {} bytes but body has {}",
                range.len(),
                data.len()
            )));
        }

        let slot = self.registry.slot(upload_id).await?;

        let actual = ContentHash::compute(&data);
        if let Some(expected) = expected_hash
            && expected != actual
        {
            tracing::warn!(
                upload_id = %upload_id,
                expected = %expected,
                actual = %actual,
                "Chunk failed integrity check"
            );
            return Err(UploadError::ChunkIntegrityError {
                range,
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }

        let ttl = self.registry.ttl();
        {
            let mut session = lock(&slot);
            match session.state {
                UploadState::Open => {}
                UploadState::Committing => return Err(UploadError::CommitInProgress(upload_id)),
                UploadState::Committed | UploadState::Expired => {
                    return Err(UploadError::SessionNotFound(upload_id));
                }
            }
            if !range.fits_within(session.declared_size) {
                return Err(UploadError::InvalidRange(format!(
                    "range {range} exceeds declared size {}",
                    session.declared_size
                )));
            }

            if let Some(existing) = session.chunk_for(&range) {
                if existing.hash != actual {
                    return Err(UploadError::RangeConflict {
                        requested: range,
                        existing: range,
                    });
                }
                session.touch(OffsetDateTime::now_utc(), ttl);
                tracing::debug!(upload_id = %upload_id, "Duplicate chunk acknowledged");
                return Ok(ChunkAck {
                    upload_id,
                    range,
                    bytes_received: session.bytes_received(),
                    declared_size: session.declared_size,
                    complete: session.is_complete(),
                    duplicate: true,
                });
            }

            let conflict = session
                .received_ranges
                .find_overlap(&range)
                .or_else(|| session.pending_ranges.find_overlap(&range));
            if let Some(existing) = conflict {
                return Err(UploadError::RangeConflict {
                    requested: range,
                    existing,
                });
            }

            session
                .pending_ranges
                .insert(range)
                .map_err(|existing| UploadError::RangeConflict {
                    requested: range,
                    existing,
                })?;
            session.touch(OffsetDateTime::now_utc(), ttl);
        }

        let reservation = Reservation::new(slot, range);
        let key = upload_id.chunk_key(&range);
        self.storage.put(&key, data).await?;

        let ack = {
            let mut session = lock(&reservation.slot);
            if session.state == UploadState::Expired {
                None
            } else {
                let now = OffsetDateTime::now_utc();
                session
                    .record_chunk(ReceivedChunk {
                        range,
                        hash: actual,
                        received_at: now,
                    })
                    .map_err(|existing| UploadError::RangeConflict {
                        requested: range,
                        existing,
                    })?;
                session.touch(now, ttl);
                Some(ChunkAck {
                    upload_id,
                    range,
                    bytes_received: session.bytes_received(),
                    declared_size: session.declared_size,
                    complete: session.is_complete(),
                    duplicate: false,
                })
            }
        };
        reservation.release();

        match ack {
            Some(ack) => {
                tracing::debug!(
                    upload_id = %upload_id,
                    bytes_received = ack.bytes_received,
                    complete = ack.complete,
                    "Chunk stored"
                );
                Ok(ack)
            }
            None => {
                // The session expired while the bytes were in flight and its
                // purge may already have run.
                if let Err(e) = self.storage.delete(&key).await
                    && !matches!(e, StorageError::NotFound(_))
                {
                    tracing::warn!(key = %key, error = %e, "Failed to delete orphaned chunk");
                }
                Err(UploadError::SessionNotFound(upload_id))
            }
        }
    }

    /// Stream the given chunks of a session back-to-back.
    ///
    /// Chunk objects are opened lazily, one at a time, in the order given.
    pub fn stream(&self, upload_id: UploadId, chunks: Vec<ReceivedChunk>) -> ByteStream {
        let storage = self.storage.clone();
        let stream = futures::stream::iter(chunks)
            .then(move |chunk| {
                let storage = storage.clone();
                async move { storage.get_stream(&upload_id.chunk_key(&chunk.range)).await }
            })
            .map(|opened| match opened {
                Ok(stream) => stream,
                Err(e) => Box::pin(futures::stream::once(async move { Err(e) })) as ByteStream,
            })
            .flatten();
        Box::pin(stream)
    }

    /// Delete every stored chunk of a session.
    pub async fn purge(&self, upload_id: UploadId) -> UploadResult<usize> {
        Ok(purge_chunk_objects(self.storage.as_ref(), upload_id).await?)
    }
}

/// Delete every chunk object stored under a session's prefix.
///
/// Objects that vanish concurrently are not an error.
pub(crate) async fn purge_chunk_objects(
    storage: &dyn ObjectStore,
    upload_id: UploadId,
) -> StorageResult<usize> {
    let keys = storage.list(&upload_id.chunk_prefix()).await?;
    let mut deleted = 0;
    for key in keys {
        match storage.delete(&key).await {
            Ok(()) => deleted += 1,
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(deleted)
}

/// A pending-range reservation, released when dropped.
///
/// Covers the window where the chunk bytes are being written: if the write
/// fails or the request future is dropped, the range becomes free again.
struct Reservation {
    slot: SessionSlot,
    range: ByteRange,
}

impl Reservation {
    fn new(slot: SessionSlot, range: ByteRange) -> Self {
        Self { slot, range }
    }

    fn release(self) {
        drop(self);
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        lock(&self.slot).pending_ranges.remove(&self.range);
    }
}
