//! Published blob store.
//!
//! One [`CacheStore`] is shared between the updater (single writer) and any
//! number of readers. The blob and both timestamps live behind a single
//! reader/writer lock so a reader always sees one consistent snapshot.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Blob and timestamps as seen by a reader.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    /// Compressed blob; `None` until the first successful compilation.
    pub blob: Option<Arc<[u8]>>,
    /// Start of the last batch that changed the blob
    pub last_modification: Option<DateTime<Utc>>,
    /// Start of the last batch, successful or not
    pub last_batch: Option<DateTime<Utc>>,
}

/// Holder of the single published blob.
#[derive(Debug, Default)]
pub struct CacheStore {
    inner: RwLock<CacheSnapshot>,
    /// Optional upper bound on the blob size in bytes
    max_size: Option<usize>,
}

impl CacheStore {
    /// Create an empty store without a size limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that refuses blobs larger than `max_size` bytes.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            inner: RwLock::new(CacheSnapshot::default()),
            max_size: Some(max_size),
        }
    }

    /// Replace the blob and move both timestamps to `at`.
    ///
    /// On error nothing is changed.
    pub fn publish(&self, blob: Arc<[u8]>, at: DateTime<Utc>) -> Result<()> {
        if let Some(max) = self.max_size {
            if blob.len() > max {
                return Err(Error::Compile(format!(
                    "blob of {} bytes exceeds the {} bytes cache limit",
                    blob.len(),
                    max
                )));
            }
        }

        let mut guard = self.inner.write();
        guard.blob = Some(blob);
        guard.last_modification = Some(at);
        if guard.last_batch.map_or(true, |last| last < at) {
            guard.last_batch = Some(at);
        }
        Ok(())
    }

    /// Record a finished batch that started at `at`.
    pub fn record_batch(&self, at: DateTime<Utc>) {
        self.inner.write().last_batch = Some(at);
    }

    /// Current blob, if any.
    pub fn read(&self) -> Option<Arc<[u8]>> {
        self.inner.read().blob.clone()
    }

    /// Current blob together with its timestamps.
    pub fn snapshot(&self) -> CacheSnapshot {
        self.inner.read().clone()
    }

    /// Start of the last batch that changed the blob.
    pub fn last_modification(&self) -> Option<DateTime<Utc>> {
        self.inner.read().last_modification
    }

    /// Start of the last batch.
    pub fn last_batch(&self) -> Option<DateTime<Utc>> {
        self.inner.read().last_batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn blob(bytes: &[u8]) -> Arc<[u8]> {
        Arc::from(bytes)
    }

    #[test]
    fn test_empty_store() {
        let store = CacheStore::new();
        assert!(store.read().is_none());
        let snap = store.snapshot();
        assert!(snap.last_modification.is_none());
        assert!(snap.last_batch.is_none());
    }

    #[test]
    fn test_publish_sets_triple() {
        let store = CacheStore::new();
        let now = Utc::now();
        store.publish(blob(b"abc"), now).unwrap();

        let snap = store.snapshot();
        assert_eq!(snap.blob.as_deref(), Some(&b"abc"[..]));
        assert_eq!(snap.last_modification, Some(now));
        assert_eq!(snap.last_batch, Some(now));
    }

    #[test]
    fn test_record_batch_keeps_blob() {
        let store = CacheStore::new();
        let first = Utc::now();
        store.publish(blob(b"abc"), first).unwrap();
        let second = first + Duration::seconds(60);
        store.record_batch(second);

        assert_eq!(store.read().as_deref(), Some(&b"abc"[..]));
        assert_eq!(store.last_modification(), Some(first));
        assert_eq!(store.last_batch(), Some(second));
    }

    #[test]
    fn test_size_limit() {
        let store = CacheStore::with_max_size(2);
        let err = store.publish(blob(b"abc"), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Compile(_)));
        assert!(store.read().is_none());
        assert!(store.last_modification().is_none());
    }

    #[test]
    fn test_old_blob_survives_readers() {
        let store = CacheStore::new();
        store.publish(blob(b"old"), Utc::now()).unwrap();
        let held = store.read().unwrap();
        store.publish(blob(b"new"), Utc::now()).unwrap();

        assert_eq!(&held[..], b"old");
        assert_eq!(store.read().as_deref(), Some(&b"new"[..]));
    }
}
