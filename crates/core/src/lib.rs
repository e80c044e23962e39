//! Core domain types for the depot chunked upload service.
//!
//! This crate defines the data model shared by the other crates:
//! - Content digests (SHA-256)
//! - Half-open byte ranges, range sets and `Content-Range` parsing
//! - Upload session lifecycle
//! - Artifact references
//! - Configuration

pub mod artifact;
pub mod config;
pub mod error;
pub mod hash;
pub mod range;
pub mod upload;

pub use artifact::ArtifactRef;
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use range::{ByteRange, ContentRange, RangeSet};
pub use upload::{ReceivedChunk, UploadId, UploadSession, UploadState};

/// Default maximum size of a single chunk: 32 MiB
pub const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Default maximum declared size of an upload: 64 GiB
pub const MAX_UPLOAD_SIZE: u64 = 64 * 1024 * 1024 * 1024;
