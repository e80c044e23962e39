use async_trait::async_trait;
use bytes::Bytes;
use depot_storage::{
    ByteStream, MemoryBackend, ObjectMeta, ObjectStore, StorageError, StorageResult,
    StreamingUpload,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Memory backend whose next `n` chunk writes fail with an I/O error.
///
/// Only keys under `uploads/` are affected so artifact writes still succeed.
#[allow(dead_code)]
pub struct FlakyBackend {
    pub inner: MemoryBackend,
    failures_left: AtomicUsize,
    pub puts: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyBackend {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryBackend::new(),
            failures_left: AtomicUsize::new(failures),
            puts: AtomicUsize::new(0),
        })
    }

    fn should_fail(&self, key: &str) -> bool {
        key.starts_with("uploads/")
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl ObjectStore for FlakyBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.should_fail(key) {
            return Err(StorageError::Io(std::io::Error::other("injected failure")));
        }
        self.inner.put(key, data).await
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        self.inner.put_stream(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

/// Memory backend whose chunk writes and artifact uploads wait for a permit.
///
/// Lets tests hold a write or commit in flight and observe the session
/// meanwhile.
#[allow(dead_code)]
pub struct GatedBackend {
    pub inner: MemoryBackend,
    gate: Semaphore,
}

#[allow(dead_code)]
impl GatedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryBackend::new(),
            gate: Semaphore::new(0),
        })
    }

    /// Let `n` gated operations through.
    pub fn open(&self, n: usize) {
        self.gate.add_permits(n);
    }

    async fn pass(&self) -> StorageResult<()> {
        self.gate
            .acquire()
            .await
            .map(|permit| permit.forget())
            .map_err(|_| StorageError::Io(std::io::Error::other("gate closed")))
    }
}

#[async_trait]
impl ObjectStore for GatedBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        if key.starts_with("uploads/") {
            self.pass().await?;
        }
        self.inner.put(key, data).await
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        if key.starts_with("artifacts/") {
            self.pass().await?;
        }
        self.inner.put_stream(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "gated"
    }
}
