//! Retrying upload pipeline with progress streaming

use super::types::{percent, RetryDecision, UploadCompleted, UploadSession};
use crate::config::RetryPolicy;
use crate::error::{ErrorClass, TransportError, UploadError};
use crate::remote::{content_type_for, ObjectMetadata, ObjectStore, ProgressFn, RemoteObject};
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Stream};
use log::{debug, info, warn};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};

/// Capacity of the shared completion channel.
const COMPLETED_CHANNEL_CAPACITY: usize = 16;

pub type ProgressItem = Result<u8, UploadError>;

/// Lazy stream of upload percentages.
///
/// The upload starts on first poll and runs to completion or exhaustion of the
/// retry budget even if the stream is dropped. On success the last item is
/// `Ok(100)`; on failure the last item is the error.
pub struct ProgressStream {
    driver: Option<BoxFuture<'static, ()>>,
    rx: mpsc::UnboundedReceiver<ProgressItem>,
}

impl Stream for ProgressStream {
    type Item = ProgressItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(driver) = self.driver.take() {
            tokio::spawn(driver);
        }
        self.rx.poll_recv(cx)
    }
}

/// Forwards progress, never letting the reported value go backwards.
struct ProgressReporter {
    tx: mpsc::UnboundedSender<ProgressItem>,
    high_water: AtomicI16,
}

impl ProgressReporter {
    fn new(tx: mpsc::UnboundedSender<ProgressItem>) -> Self {
        Self {
            tx,
            high_water: AtomicI16::new(-1),
        }
    }

    fn report(&self, pct: u8) {
        let pct = i16::from(pct);
        if self.high_water.fetch_max(pct, Ordering::SeqCst) < pct {
            let _ = self.tx.send(Ok(pct as u8));
        }
    }

    fn finish(&self) {
        self.high_water.store(100, Ordering::SeqCst);
        let _ = self.tx.send(Ok(100));
    }

    fn fail(&self, error: UploadError) {
        let _ = self.tx.send(Err(error));
    }

    fn current(&self) -> u8 {
        self.high_water.load(Ordering::SeqCst).max(0) as u8
    }
}

/// Publishes files to the remote store.
pub struct UploadPipeline<T> {
    store: Arc<T>,
    policy: RetryPolicy,
    prefix: String,
    completed: broadcast::Sender<UploadCompleted>,
}

impl<T> Clone for UploadPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            policy: self.policy,
            prefix: self.prefix.clone(),
            completed: self.completed.clone(),
        }
    }
}

/// Remote path for `filename` under `prefix`. Same name, same object.
pub fn object_path(prefix: &str, filename: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let filename = filename.trim_start_matches('/');
    if prefix.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", prefix, filename)
    }
}

impl<T: ObjectStore> UploadPipeline<T> {
    pub fn new(store: Arc<T>, policy: RetryPolicy, prefix: impl Into<String>) -> Self {
        let (completed, _) = broadcast::channel(COMPLETED_CHANNEL_CAPACITY);
        Self {
            store,
            policy,
            prefix: prefix.into(),
            completed,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Completion events for every upload started through this pipeline.
    pub fn subscribe_completed(&self) -> broadcast::Receiver<UploadCompleted> {
        self.completed.subscribe()
    }

    /// Upload `bytes` to `path`. Nothing is sent until the stream is polled.
    pub fn upload(&self, path: impl Into<String>, bytes: Vec<u8>) -> ProgressStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = drive_upload(
            self.store.clone(),
            self.policy,
            path.into(),
            Arc::new(bytes),
            self.completed.clone(),
            tx,
        )
        .boxed();

        ProgressStream {
            driver: Some(driver),
            rx,
        }
    }

    /// Read a local file and upload it under the collection prefix.
    ///
    /// Returns the remote path alongside the progress stream.
    pub async fn upload_file(&self, local: &Path) -> Result<(String, ProgressStream), UploadError> {
        let filename = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::Io {
                path: local.to_path_buf(),
                message: "path has no file name".to_string(),
            })?;
        let bytes = tokio::fs::read(local).await.map_err(|e| UploadError::Io {
            path: local.to_path_buf(),
            message: e.to_string(),
        })?;

        let path = object_path(&self.prefix, filename);
        Ok((path.clone(), self.upload(path, bytes)))
    }

    /// Public URL of an uploaded object. Fails until the upload has completed.
    pub async fn get_download_url(&self, path: &str) -> Result<String, UploadError> {
        self.store
            .download_url(path)
            .await
            .map_err(|e| terminal_error(path, e))
    }

    pub async fn delete(&self, path: &str) -> Result<(), UploadError> {
        self.store
            .delete_object(path)
            .await
            .map_err(|e| terminal_error(path, e))?;
        info!("Deleted remote object {}", path);
        Ok(())
    }

    pub async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, UploadError> {
        self.store
            .list_objects(prefix)
            .await
            .map_err(|e| terminal_error(prefix, e))
    }
}

fn terminal_error(path: &str, error: TransportError) -> UploadError {
    if let TransportError::NotFound(_) = error {
        return UploadError::NotUploaded {
            path: path.to_string(),
        };
    }
    match error.class() {
        ErrorClass::Configuration => UploadError::Configuration {
            path: path.to_string(),
            source: error,
        },
        _ => UploadError::Failed(error),
    }
}

async fn drive_upload<T: ObjectStore>(
    store: Arc<T>,
    policy: RetryPolicy,
    path: String,
    body: Arc<Vec<u8>>,
    completed: broadcast::Sender<UploadCompleted>,
    tx: mpsc::UnboundedSender<ProgressItem>,
) {
    let reporter = Arc::new(ProgressReporter::new(tx));
    let content_type = content_type_for(&path);
    let mut session = UploadSession::new(path.clone());

    loop {
        session.begin_attempt();
        info!(
            "Starting upload: {} ({} bytes), attempt {}/{}",
            path,
            body.len(),
            session.attempts(),
            policy.max_attempts()
        );

        let progress: ProgressFn = {
            let reporter = reporter.clone();
            let path = path.clone();
            Arc::new(move |sent, total| {
                let pct = percent(sent, total);
                debug!("Upload progress {}: {}% ({}/{} bytes)", path, pct, sent, total);
                // 100 is only reported once the store has accepted the object
                reporter.report(pct.min(99));
            })
        };

        let result = store
            .put_object(&path, body.clone(), &ObjectMetadata::now(content_type), progress)
            .await;
        session.progress = reporter.current();

        match result {
            Ok(()) => {
                session.complete();
                reporter.finish();
                info!("Upload complete: {} after {} attempt(s)", path, session.attempts());
                let _ = completed.send(UploadCompleted {
                    path,
                    attempts: session.attempts(),
                });
                return;
            }
            Err(error) => {
                warn!("Upload attempt for {} failed: {}", path, error);
                match session.on_failure(error, &policy) {
                    RetryDecision::RetryAfter(delay) => {
                        warn!(
                            "Retrying upload of {} in {:?} (attempt {}/{})",
                            path,
                            delay,
                            session.attempt + 1,
                            policy.max_attempts()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::Fail(error) => {
                        warn!("Upload of {} failed: {}", path, error);
                        reporter.fail(error);
                        return;
                    }
                }
            }
        }
    }
}
