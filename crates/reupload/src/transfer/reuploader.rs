use std::sync::Arc;

use tracing::debug_span;

use super::naming::destination_name;
use super::retry::{retry_with_backoff, RetryPolicy};
use super::{FileTransfer, TransferOutcome};
use crate::model::FileMetadata;
use crate::storage::{Notifier, ObjectStore, PutOutcome, QueueMessage};

/// [`FileTransfer`] over a pair of object stores with an optional queue
/// notification after each new upload.
pub struct Reuploader {
    source: Arc<dyn ObjectStore>,
    target: Arc<dyn ObjectStore>,
    target_container: String,
    notifier: Option<Arc<dyn Notifier>>,
    retry: RetryPolicy,
}

impl Reuploader {
    pub fn new(
        source: Arc<dyn ObjectStore>,
        target: Arc<dyn ObjectStore>,
        target_container: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            target_container: target_container.into(),
            notifier: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn notify(&self, blob_name: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let sent = QueueMessage::new(&self.target_container, blob_name)
            .to_json()
            .and_then(|message| {
                retry_with_backoff(&self.retry, "queue send", || notifier.send(&message))
            });
        if let Err(e) = sent {
            log::warn!("Uploaded {} but queue notification failed: {}", blob_name, e);
        }
    }
}

impl FileTransfer for Reuploader {
    fn transfer(&self, file: &FileMetadata) -> TransferOutcome {
        let blob_name = destination_name(&file.workitem_name, &file.filename);
        let _span = debug_span!("transfer", blob = %blob_name).entered();

        match retry_with_backoff(&self.retry, "existence check", || self.target.exists(&blob_name)) {
            Ok(true) => {
                log::debug!("{} already in target, skipping download", blob_name);
                return TransferOutcome::AlreadyPresent;
            }
            Ok(false) => {}
            Err(e) => log::warn!("Existence check for {} failed, uploading anyway: {}", blob_name, e),
        }

        let bytes = match retry_with_backoff(&self.retry, "download", || self.source.get(&file.source_uri)) {
            Ok(bytes) => bytes,
            Err(e) => return TransferOutcome::Failed(format!("Download failed: {e}")),
        };

        match retry_with_backoff(&self.retry, "upload", || self.target.put(&blob_name, &bytes)) {
            Ok(PutOutcome::Created) => {
                log::debug!("Uploaded {} ({} bytes)", blob_name, bytes.len());
                self.notify(&blob_name);
                TransferOutcome::Uploaded
            }
            Ok(PutOutcome::AlreadyExists) => {
                log::debug!("{} was created concurrently", blob_name);
                TransferOutcome::AlreadyPresent
            }
            Err(e) => TransferOutcome::Failed(format!("Upload failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalObjectStore, QueueFileNotifier, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Source that counts downloads and can be told to fail.
    struct CountingSource {
        inner: LocalObjectStore,
        gets: AtomicUsize,
        transient_failures: AtomicUsize,
    }

    impl ObjectStore for CountingSource {
        fn exists(&self, name: &str) -> Result<bool, StoreError> {
            self.inner.exists(name)
        }

        fn get(&self, name: &str) -> Result<Vec<u8>, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.transient_failures.load(Ordering::SeqCst) > 0 {
                self.transient_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Transient("throttled".into()));
            }
            self.inner.get(name)
        }

        fn put(&self, name: &str, bytes: &[u8]) -> Result<PutOutcome, StoreError> {
            self.inner.put(name, bytes)
        }
    }

    struct Fixture {
        _dir: TempDir,
        source: Arc<CountingSource>,
        target: Arc<LocalObjectStore>,
        notifier: Arc<QueueFileNotifier>,
        reuploader: Reuploader,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(CountingSource {
            inner: LocalObjectStore::new(dir.path().join("source")),
            gets: AtomicUsize::new(0),
            transient_failures: AtomicUsize::new(0),
        });
        let target = Arc::new(LocalObjectStore::new(dir.path().join("target")));
        let notifier = Arc::new(QueueFileNotifier::new(dir.path().join("queue.jsonl")));
        let reuploader = Reuploader::new(source.clone(), target.clone(), "results")
            .with_notifier(notifier.clone())
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)));
        Fixture {
            _dir: dir,
            source,
            target,
            notifier,
            reuploader,
        }
    }

    fn file(filename: &str) -> FileMetadata {
        FileMetadata {
            job_id: "j1".into(),
            workitem_id: "w1".into(),
            workitem_name: "bench".into(),
            source_uri: format!("src/{filename}"),
            filename: filename.into(),
        }
    }

    #[test]
    fn test_uploads_and_notifies() {
        let fx = fixture();
        fx.source.inner.put("src/r.json", b"{\"ok\":1}").unwrap();

        assert_eq!(fx.reuploader.transfer(&file("r.json")), TransferOutcome::Uploaded);
        assert_eq!(fx.target.get("bench-r.json").unwrap(), b"{\"ok\":1}");

        let queued = std::fs::read_to_string(fx.notifier.path()).unwrap();
        let msg: QueueMessage = serde_json::from_str(queued.trim()).unwrap();
        assert_eq!(msg, QueueMessage::new("results", "bench-r.json"));
    }

    #[test]
    fn test_existing_destination_skips_download() {
        let fx = fixture();
        fx.target.put("bench-r.json", b"old").unwrap();

        assert_eq!(fx.reuploader.transfer(&file("r.json")), TransferOutcome::AlreadyPresent);
        assert_eq!(fx.source.gets.load(Ordering::SeqCst), 0);
        assert!(!fx.notifier.path().exists());
    }

    #[test]
    fn test_missing_source_fails() {
        let fx = fixture();
        let outcome = fx.reuploader.transfer(&file("gone.json"));
        assert!(!outcome.is_success());
        assert!(outcome.error().unwrap().starts_with("Download failed"));
        assert_eq!(fx.source.gets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_download_is_retried() {
        let fx = fixture();
        fx.source.inner.put("src/r.json", b"x").unwrap();
        fx.source.transient_failures.store(2, Ordering::SeqCst);

        assert_eq!(fx.reuploader.transfer(&file("r.json")), TransferOutcome::Uploaded);
        assert_eq!(fx.source.gets.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_notification_failure_does_not_fail_upload() {
        struct BrokenQueue;
        impl Notifier for BrokenQueue {
            fn send(&self, _message: &str) -> Result<(), StoreError> {
                Err(StoreError::Fatal("queue gone".into()))
            }
        }

        let fx = fixture();
        fx.source.inner.put("src/r.json", b"x").unwrap();
        let reuploader = Reuploader::new(fx.source.clone(), fx.target.clone(), "results")
            .with_notifier(Arc::new(BrokenQueue));

        assert_eq!(reuploader.transfer(&file("r.json")), TransferOutcome::Uploaded);
        assert!(fx.target.exists("bench-r.json").unwrap());
    }
}
