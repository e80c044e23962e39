//! Upload coordination errors.

use depot_core::{ByteRange, UploadId};
use depot_storage::StorageError;
use thiserror::Error;

/// Errors returned by the upload coordinator.
///
/// Every variant maps to a stable [`kind`](UploadError::kind) so callers can
/// decide whether to retry on the same session or start over.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid upload size {size}: must be between 1 and {max}")]
    InvalidSize { size: u64, max: u64 },

    #[error("invalid chunk range: {0}")]
    InvalidRange(String),

    #[error("upload session {0} not found")]
    SessionNotFound(UploadId),

    #[error("range {requested} conflicts with {existing}")]
    RangeConflict {
        requested: ByteRange,
        existing: ByteRange,
    },

    #[error("chunk {range} failed integrity check: expected {expected}, got {actual}")]
    ChunkIntegrityError {
        range: ByteRange,
        expected: String,
        actual: String,
    },

    #[error("upload incomplete: {missing_bytes} bytes missing")]
    IncompleteUpload { missing_bytes: u64 },

    #[error("upload session {0} is being committed")]
    CommitInProgress(UploadId),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl UploadError {
    /// Stable error code for programmatic handling.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSize { .. } => "invalid_size",
            Self::InvalidRange(_) => "invalid_range",
            Self::SessionNotFound(_) => "session_not_found",
            Self::RangeConflict { .. } => "range_conflict",
            Self::ChunkIntegrityError { .. } => "chunk_integrity_error",
            Self::IncompleteUpload { .. } => "incomplete_upload",
            Self::CommitInProgress(_) => "commit_in_progress",
            Self::DigestMismatch { .. } => "digest_mismatch",
            Self::Timeout(_) => "timeout",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Whether the session survives this error, so the client may retry
    /// against it (possibly with corrected input).
    ///
    /// `SessionNotFound` is the only error that requires a new session.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::SessionNotFound(_))
    }
}

impl From<depot_core::Error> for UploadError {
    fn from(e: depot_core::Error) -> Self {
        Self::InvalidRange(e.to_string())
    }
}

/// Result type for upload operations.
pub type UploadResult<T> = std::result::Result<T, UploadError>;
