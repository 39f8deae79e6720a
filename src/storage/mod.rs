//! Persistent key-value storage.
//!
//! Everything durable in the engine - cached snapshots, pending mutations,
//! session keys - goes through [`KeyValueStore`]. Keys are opaque ASCII
//! strings, values are serialized text. The store is fail-soft: every error
//! is reported to the caller and never crashes the process, and there is no
//! multi-key atomicity - callers that need read-modify-write on one key must
//! serialize it themselves (the pending queue holds a mutex across its
//! read+write for exactly that reason).

pub mod file;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::Mutex;

pub use file::FileStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// An asynchronous string store. Implementations must tolerate concurrent
/// use from interleaved tasks.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// In-memory store. The test fixture, and the in-session fallback when
/// durable storage is unavailable on a device.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, for exercising fail-soft paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write failure injected".into()));
        }
        self.inner.lock().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write failure injected".into()));
        }
        self.inner.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_injected_write_failure() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        store.set_fail_writes(true);
        assert!(store.set("k", "w").await.is_err());
        // Reads keep working and see the pre-failure value.
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }
}
