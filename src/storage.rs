//! Object-storage abstraction for the upload pipeline.
//!
//! The core never talks to a concrete storage backend directly; it goes
//! through the [`ObjectStore`] trait so the transaction manager can be tested
//! against fakes and host applications can plug in whatever backend they run
//! (cloud blob container, filesystem, ...). The crate ships only
//! [`MemoryObjectStore`], which is what the tests and previews use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::Mutex;

/// Errors emitted by object-storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend refused or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Network-level failure reaching the backend.
    #[error("network failure reaching storage: {0}")]
    Transport(String),

    /// The operation exceeded its deadline; treated like a transport failure.
    #[error("storage operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// One stored object as reported back to the caller.
///
/// `name` is the submitted file's original name; the collision-resistant
/// object name lives inside `url`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoredFile {
    pub name: String,
    pub size: usize,
    pub url: String,
}

/// Extract the object name from a bare name or a URL.
///
/// Deletion callers may hold either form; the object name is the last path
/// segment of a URL, and a bare name passes through unchanged.
pub fn object_name_from_url(name_or_url: &str) -> &str {
    name_or_url.rsplit('/').next().unwrap_or(name_or_url)
}

/// Trait abstracting over object-storage backends.
///
/// `put` is all-or-nothing per call: on `Ok` the object is durably stored
/// under `name` and reachable at the returned URL; on `Err` nothing was
/// stored. `delete` accepts a name or a URL and tolerates objects that are
/// already gone — the rollback path depends on being able to re-delete
/// without a new failure mode.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `name` and return a durable URL for the object.
    async fn put(&self, name: &str, bytes: &[u8], content_type: &str)
        -> Result<String, StorageError>;

    /// Delete the object named by `name_or_url` if it still exists.
    async fn delete(&self, name_or_url: &str) -> Result<(), StorageError>;
}

/// In-memory [`ObjectStore`] for tests and previews.
///
/// Tracks call counts so tests can assert on storage traffic (e.g. "exactly
/// one delete after a mid-batch failure") without a scripted mock.
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    base_url: String,
    put_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            base_url: "memory://reports".to_string(),
            put_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `put` calls made so far.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls made so far.
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Number of objects currently stored.
    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    /// Whether an object with the given name is currently stored.
    pub async fn contains(&self, name: &str) -> bool {
        self.objects.lock().await.contains_key(name)
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        name: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.lock().await;
        objects.insert(name.to_string(), bytes.to_vec());
        Ok(format!("{}/{}", self.base_url, name))
    }

    async fn delete(&self, name_or_url: &str) -> Result<(), StorageError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let name = object_name_from_url(name_or_url);
        let mut objects = self.objects.lock().await;
        // Deleting an absent object is fine; rollback may race real deletion.
        objects.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_from_bare_name() {
        assert_eq!(object_name_from_url("20240101_abcd_report.pdf"), "20240101_abcd_report.pdf");
    }

    #[test]
    fn object_name_from_full_url() {
        assert_eq!(
            object_name_from_url("https://store.example.com/reports/20240101_abcd_report.pdf"),
            "20240101_abcd_report.pdf"
        );
    }

    #[tokio::test]
    async fn memory_store_put_then_delete() {
        let store = MemoryObjectStore::new();
        let url = store.put("a.pdf", b"%PDF-1.4", "application/pdf").await.unwrap();
        assert!(url.ends_with("/a.pdf"));
        assert!(store.contains("a.pdf").await);

        store.delete(&url).await.unwrap();
        assert!(!store.contains("a.pdf").await);
        assert_eq!(store.put_calls(), 1);
        assert_eq!(store.delete_calls(), 1);
    }

    #[tokio::test]
    async fn memory_store_delete_is_idempotent() {
        let store = MemoryObjectStore::new();
        store.delete("never-stored.pdf").await.unwrap();
        store.delete("never-stored.pdf").await.unwrap();
        assert_eq!(store.object_count().await, 0);
        assert_eq!(store.delete_calls(), 2);
    }

    #[tokio::test]
    async fn memory_store_deletes_by_url_or_name() {
        let store = MemoryObjectStore::new();
        store.put("x.pdf", b"data", "application/pdf").await.unwrap();
        store.delete("x.pdf").await.unwrap();
        assert_eq!(store.object_count().await, 0);

        let url = store.put("y.pdf", b"data", "application/pdf").await.unwrap();
        store.delete(&url).await.unwrap();
        assert_eq!(store.object_count().await, 0);
    }
}
