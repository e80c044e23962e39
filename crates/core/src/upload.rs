//! Upload session types and lifecycle.

use crate::hash::ContentHash;
use crate::range::{ByteRange, RangeSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::{OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::UploadSession(format!("invalid upload ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Object store prefix holding this session's chunks.
    pub fn chunk_prefix(&self) -> String {
        format!("uploads/{}/", self.0)
    }

    /// Object store key of the chunk covering `range`.
    ///
    /// Offsets are zero-padded so that a lexical listing is in byte order.
    pub fn chunk_key(&self, range: &ByteRange) -> String {
        format!(
            "uploads/{}/{:020}-{:020}",
            self.0,
            range.start(),
            range.end()
        )
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Session is open and accepting chunks.
    Open,
    /// A commit is assembling and verifying the session.
    Committing,
    /// Session was successfully committed.
    Committed,
    /// Session expired or was abandoned.
    Expired,
}

impl UploadState {
    /// Check if the session can receive chunks.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk that has been stored for a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedChunk {
    /// Byte range covered by the chunk.
    pub range: ByteRange,
    /// SHA-256 of the stored bytes.
    pub hash: ContentHash,
    /// When the chunk was received.
    pub received_at: OffsetDateTime,
}

/// An upload session tracking which byte ranges have arrived.
#[derive(Clone, Debug)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: UploadId,
    /// Total expected size in bytes. Always positive.
    pub declared_size: u64,
    /// Ranges whose bytes are durably stored.
    pub received_ranges: RangeSet,
    /// Ranges reserved by chunk writes still in flight.
    pub pending_ranges: RangeSet,
    /// Stored chunks keyed by range start.
    pub chunks: BTreeMap<u64, ReceivedChunk>,
    /// Digest supplied by the most recent commit attempt.
    pub expected_digest: Option<ContentHash>,
    /// Current session state.
    pub state: UploadState,
    /// When the session was created.
    pub created_at: OffsetDateTime,
    /// When the session last saw activity.
    pub updated_at: OffsetDateTime,
    /// When the session expires unless touched again.
    pub expires_at: OffsetDateTime,
}

/// `now + ttl`, clamped to the latest representable instant.
fn expiry_after(now: OffsetDateTime, ttl: time::Duration) -> OffsetDateTime {
    now.checked_add(ttl)
        .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc())
}

impl UploadSession {
    /// Create a new open session.
    pub fn new(declared_size: u64, ttl: time::Duration) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: UploadId::new(),
            declared_size,
            received_ranges: RangeSet::new(),
            pending_ranges: RangeSet::new(),
            chunks: BTreeMap::new(),
            expected_digest: None,
            state: UploadState::Open,
            created_at: now,
            updated_at: now,
            expires_at: expiry_after(now, ttl),
        }
    }

    /// Check if the session's TTL has elapsed at `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    /// Check if the session has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Record activity, pushing expiry out by `ttl`.
    pub fn touch(&mut self, now: OffsetDateTime, ttl: time::Duration) {
        self.updated_at = now;
        self.expires_at = expiry_after(now, ttl);
    }

    /// Bytes durably received so far.
    pub fn bytes_received(&self) -> u64 {
        self.received_ranges.total_bytes()
    }

    /// Bytes of `[0, declared_size)` not yet received.
    pub fn missing_bytes(&self) -> u64 {
        self.declared_size - self.bytes_received()
    }

    /// Whether every byte of the upload has been received.
    pub fn is_complete(&self) -> bool {
        self.received_ranges.covers_exactly(self.declared_size)
    }

    /// The stored chunk covering exactly `range`, if any.
    pub fn chunk_for(&self, range: &ByteRange) -> Option<&ReceivedChunk> {
        self.chunks
            .get(&range.start())
            .filter(|chunk| chunk.range == *range)
    }

    /// Stored chunks in byte order.
    pub fn ordered_chunks(&self) -> Vec<ReceivedChunk> {
        self.chunks.values().cloned().collect()
    }

    /// Move a reserved range into the received set.
    ///
    /// Fails with the conflicting range if the chunk overlaps received data.
    pub fn record_chunk(&mut self, chunk: ReceivedChunk) -> Result<(), ByteRange> {
        self.pending_ranges.remove(&chunk.range);
        self.received_ranges.insert(chunk.range)?;
        self.chunks.insert(chunk.range.start(), chunk);
        Ok(())
    }

    /// Build the status view of this session.
    pub fn status(&self) -> UploadStatusResponse {
        UploadStatusResponse {
            upload_id: self.id.to_string(),
            size: self.declared_size,
            state: self.state,
            bytes_received: self.bytes_received(),
            completed: self.is_complete(),
            ranges: self
                .received_ranges
                .iter()
                .map(|r| [r.start(), r.end()])
                .collect(),
            expires_at: self.expires_at,
        }
    }
}

/// Request to create an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateUploadRequest {
    /// Total size of the file in bytes.
    pub size: u64,
}

/// Response from creating an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateUploadResponse {
    pub upload_id: String,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Response from querying upload state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadStatusResponse {
    pub upload_id: String,
    pub size: u64,
    pub state: UploadState,
    pub bytes_received: u64,
    /// Whether `ranges` covers the whole upload.
    pub completed: bool,
    /// Received half-open ranges as `[start, end]` pairs, in byte order.
    pub ranges: Vec<[u64; 2]>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Acknowledgment of an accepted chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkAckResponse {
    pub upload_id: String,
    /// The accepted half-open range as `[start, end]`.
    pub range: [u64; 2],
    pub bytes_received: u64,
    pub size: u64,
    pub completed: bool,
}

/// Request to commit an upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitUploadRequest {
    /// Expected SHA-256 of the whole file, hex encoded.
    pub sha256: String,
}
