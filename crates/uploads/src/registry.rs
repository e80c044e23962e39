//! Session registry: upload id → session state.
//!
//! The map is sharded (`DashMap`) and every session sits behind its own
//! mutex, so operations on different sessions never contend. Session mutexes
//! are only held for short, non-async critical sections; no guard is ever
//! held across an `.await` or while touching the map.

use crate::chunks::purge_chunk_objects;
use crate::error::{UploadError, UploadResult};
use dashmap::DashMap;
use depot_core::config::UploadConfig;
use depot_core::{UploadId, UploadSession, UploadState};
use depot_storage::ObjectStore;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;

/// Shared handle to one session's state.
pub(crate) type SessionSlot = Arc<Mutex<UploadSession>>;

/// Lock a session, recovering the state if a holder panicked.
///
/// Critical sections never leave a session half-updated across a panic point,
/// so the inner value is still consistent.
pub(crate) fn lock(slot: &SessionSlot) -> MutexGuard<'_, UploadSession> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of live upload sessions.
pub struct SessionRegistry {
    sessions: DashMap<UploadId, SessionSlot>,
    storage: Arc<dyn ObjectStore>,
    ttl: time::Duration,
    max_upload_size: u64,
}

impl SessionRegistry {
    /// Create a registry whose sessions keep their chunks in `storage`.
    pub fn new(storage: Arc<dyn ObjectStore>, config: &UploadConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            storage,
            ttl: config.session_ttl(),
            max_upload_size: config.max_upload_size,
        }
    }

    /// Idle time after which a session expires.
    pub fn ttl(&self) -> time::Duration {
        self.ttl
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Open a new session for an upload of `declared_size` bytes.
    #[tracing::instrument(skip(self))]
    pub fn create(&self, declared_size: u64) -> UploadResult<UploadId> {
        if declared_size == 0 || declared_size > self.max_upload_size {
            return Err(UploadError::InvalidSize {
                size: declared_size,
                max: self.max_upload_size,
            });
        }

        let session = UploadSession::new(declared_size, self.ttl);
        let id = session.id;
        self.sessions.insert(id, Arc::new(Mutex::new(session)));

        tracing::info!(upload_id = %id, declared_size, "Upload session created");
        Ok(id)
    }

    /// Snapshot of a live session.
    pub async fn get(&self, id: UploadId) -> UploadResult<UploadSession> {
        let slot = self.slot(id).await?;
        let session = lock(&slot).clone();
        Ok(session)
    }

    /// Snapshot of a session without expiry checks.
    pub fn peek(&self, id: UploadId) -> Option<UploadSession> {
        let slot = self.sessions.get(&id).map(|entry| entry.value().clone())?;
        let session = lock(&slot).clone();
        Some(session)
    }

    /// Look up a live session, expiring it first if its TTL has elapsed.
    pub(crate) async fn slot(&self, id: UploadId) -> UploadResult<SessionSlot> {
        let slot = self
            .sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(UploadError::SessionNotFound(id))?;

        let stale = {
            let session = lock(&slot);
            match session.state {
                UploadState::Open => session.is_expired(),
                UploadState::Committing => false,
                UploadState::Committed | UploadState::Expired => {
                    return Err(UploadError::SessionNotFound(id));
                }
            }
        };

        if stale {
            self.expire(id).await?;
            return Err(UploadError::SessionNotFound(id));
        }
        Ok(slot)
    }

    /// Expire a session and release its chunk storage.
    ///
    /// Idempotent: returns `false` when the session was already gone. Chunk
    /// writes racing with expiry either land before the purge and are removed
    /// by it, or observe the `Expired` state and clean up after themselves.
    #[tracing::instrument(skip(self))]
    pub async fn expire(&self, id: UploadId) -> UploadResult<bool> {
        let Some((_, slot)) = self.sessions.remove(&id) else {
            return Ok(false);
        };
        lock(&slot).state = UploadState::Expired;

        let purged = purge_chunk_objects(self.storage.as_ref(), id).await?;
        tracing::info!(upload_id = %id, chunks_purged = purged, "Upload session expired");
        Ok(true)
    }

    /// Explicitly abandon a session.
    ///
    /// Unlike [`expire`](Self::expire) this reports unknown sessions, and it
    /// refuses to pull a session out from under a running commit.
    pub async fn abort(&self, id: UploadId) -> UploadResult<()> {
        let slot = self.slot(id).await?;
        if lock(&slot).state == UploadState::Committing {
            return Err(UploadError::CommitInProgress(id));
        }
        self.expire(id).await?;
        Ok(())
    }

    /// Expire every open session whose TTL has elapsed at `now`.
    ///
    /// Sessions being committed are skipped. Returns the number of sessions
    /// expired; purge failures are logged and the sweep continues.
    pub async fn sweep_expired(&self, now: OffsetDateTime) -> usize {
        let stale: Vec<UploadId> = self
            .sessions
            .iter()
            .filter(|entry| {
                let session = lock(entry.value());
                session.state == UploadState::Open && session.is_expired_at(now)
            })
            .map(|entry| *entry.key())
            .collect();

        let mut expired = 0;
        for id in stale {
            match self.expire(id).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(upload_id = %id, error = %e, "Failed to expire upload session");
                }
            }
        }
        expired
    }

    /// Drop a finished session from the map without touching its storage.
    pub(crate) fn remove(&self, id: UploadId) {
        self.sessions.remove(&id);
    }
}
