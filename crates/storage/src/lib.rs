//! Object storage abstraction and backends for depot.
//!
//! This crate provides:
//! - The [`ObjectStore`] trait used for chunk and artifact storage
//! - Atomic writes (temp object + rename) and streaming uploads
//! - Backends: local filesystem and in-process memory

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};

use depot_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}
