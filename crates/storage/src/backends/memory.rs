//! In-process memory backend.
//!
//! Used by tests and by `storage.type = "memory"` deployments that do not need
//! durability across restarts.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

type Objects = Arc<RwLock<BTreeMap<String, Bytes>>>;

/// Memory-backed object store.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    objects: Objects,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate_key(key: &str) -> StorageResult<()> {
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|c| c == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    fn insert(objects: &Objects, key: &str, data: Bytes) {
        objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), data);
    }

    fn lookup(&self, key: &str) -> StorageResult<Bytes> {
        Self::validate_key(key)?;
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Self::validate_key(key)?;
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key))
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let data = self.lookup(key)?;
        Ok(ObjectMeta {
            size: data.len() as u64,
        })
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.lookup(key)
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let data = self.get(key).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        Self::validate_key(key)?;
        Self::insert(&self.objects, key, data);
        Ok(())
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        Self::validate_key(key)?;
        Ok(Box::new(MemoryUpload {
            objects: self.objects.clone(),
            key: key.to_string(),
            buffer: BytesMut::new(),
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Self::validate_key(key)?;
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects
            .range(prefix.to_string()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Buffers a streaming upload and publishes it on finish.
struct MemoryUpload {
    objects: Objects,
    key: String,
    buffer: BytesMut,
}

#[async_trait]
impl StreamingUpload for MemoryUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&data);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        let size = self.buffer.len() as u64;
        MemoryBackend::insert(&self.objects, &self.key, self.buffer.freeze());
        Ok(size)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
