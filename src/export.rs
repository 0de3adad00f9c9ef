//! Export of the published blob to disk.
//!
//! The blob is written to a temporary file next to the target and renamed
//! over it, so a web server serving the file never sees a partial write.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheStore;
use crate::compiler::human_size;
use crate::error::Result;

/// Atomically replace `path` with `data`.
pub fn write_blob(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Writes the blob to a file whenever its content timestamp moves.
#[derive(Debug, Clone)]
pub struct Exporter {
    path: PathBuf,
    exported: Option<DateTime<Utc>>,
}

impl Exporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exported: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Export the current blob if it changed since the last export.
    ///
    /// Returns `true` if the file was written.
    pub fn export_if_changed(&mut self, cache: &CacheStore) -> Result<bool> {
        let snapshot = cache.snapshot();
        let Some(blob) = snapshot.blob else {
            return Ok(false);
        };
        if snapshot.last_modification == self.exported {
            return Ok(false);
        }

        write_blob(&self.path, &blob)?;
        self.exported = snapshot.last_modification;
        log::info!(
            "[Export] wrote {} to {}",
            human_size(blob.len()),
            self.path.display()
        );
        Ok(true)
    }

    /// Export every `poll` until `stop` completes.
    ///
    /// `stop` is polled across iterations, so a signal arriving while a
    /// file is being written still ends the loop.
    pub async fn export_until<F>(&mut self, cache: &CacheStore, poll: Duration, stop: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        let mut ticker = tokio::time::interval(poll);
        loop {
            tokio::select! {
                biased;

                _ = &mut stop => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.export_if_changed(cache) {
                        log::error!("[Export] can't write {}: {}", self.path.display(), e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_write_blob_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocklist.gz");
        write_blob(&path, b"first").unwrap();
        write_blob(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_export_if_changed() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = Exporter::new(dir.path().join("blocklist.gz"));
        let cache = CacheStore::new();

        assert!(!exporter.export_if_changed(&cache).unwrap());
        assert!(!exporter.path().exists());

        cache.publish(Arc::from(&b"blob"[..]), Utc::now()).unwrap();
        assert!(exporter.export_if_changed(&cache).unwrap());
        assert!(!exporter.export_if_changed(&cache).unwrap());

        cache.record_batch(Utc::now());
        assert!(!exporter.export_if_changed(&cache).unwrap());
        assert_eq!(std::fs::read(exporter.path()).unwrap(), b"blob");
    }

    #[tokio::test]
    async fn test_export_until_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = Exporter::new(dir.path().join("blocklist.gz"));
        let cache = Arc::new(CacheStore::new());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let publisher = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cache.publish(Arc::from(&b"blob"[..]), Utc::now()).unwrap();
                tokio::time::sleep(Duration::from_millis(40)).await;
                let _ = tx.send(());
            })
        };

        let stop = async {
            let _ = rx.await;
        };
        tokio::time::timeout(
            Duration::from_secs(5),
            exporter.export_until(&cache, Duration::from_millis(5), stop),
        )
        .await
        .expect("export loop did not stop");
        publisher.await.unwrap();

        assert_eq!(std::fs::read(exporter.path()).unwrap(), b"blob");
    }
}
