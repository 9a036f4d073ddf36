//! Object store transport: presigned streaming PUT with progress, HEAD, DELETE, LIST

use super::client::create_s3_client;
use super::types::{encode_key_path, ObjectMetadata, ProgressFn, RemoteObject, UPLOADED_AT_KEY};
use crate::config::RemoteConfig;
use crate::error::TransportError;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use reqwest::header::CONTENT_LENGTH;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Body chunk size for progress reporting (64 KB)
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Remote object store the upload pipeline publishes to.
pub trait ObjectStore: Send + Sync + 'static {
    /// Write `body` to `key`, overwriting any existing object.
    fn put_object(
        &self,
        key: &str,
        body: Arc<Vec<u8>>,
        metadata: &ObjectMetadata,
        progress: ProgressFn,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Publicly fetchable URL for an existing object.
    fn download_url(&self, key: &str)
        -> impl Future<Output = Result<String, TransportError>> + Send;

    fn delete_object(&self, key: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn list_objects(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<RemoteObject>, TransportError>> + Send;
}

/// [`ObjectStore`] for S3-compatible buckets.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    http: reqwest::Client,
    bucket: String,
    public_domain: Option<String>,
    url_expiry: Duration,
}

impl S3ObjectStore {
    pub fn new(config: &RemoteConfig, http: reqwest::Client) -> Self {
        Self {
            client: create_s3_client(config),
            http,
            bucket: config.bucket.clone(),
            public_domain: config.public_domain.clone(),
            url_expiry: Duration::from_secs(config.url_expiry_secs),
        }
    }

    fn presigning_config(&self) -> Result<PresigningConfig, TransportError> {
        PresigningConfig::builder()
            .expires_in(self.url_expiry)
            .build()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))
    }
}

fn from_sdk_error<E>(err: SdkError<E, HttpResponse>) -> TransportError
where
    E: std::error::Error + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err.raw_response().map(|r| r.status().as_u16()) {
        Some(status) => TransportError::from_status(status, message),
        None if matches!(err, SdkError::ConstructionFailure(_)) => {
            TransportError::InvalidEndpoint(message)
        }
        None => TransportError::Network(message),
    }
}

impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        body: Arc<Vec<u8>>,
        metadata: &ObjectMetadata,
        progress: ProgressFn,
    ) -> Result<(), TransportError> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&metadata.content_type)
            .cache_control(&metadata.cache_control)
            .metadata(UPLOADED_AT_KEY, &metadata.uploaded_at)
            .presigned(self.presigning_config()?)
            .await
            .map_err(from_sdk_error)?;

        let total = body.len() as u64;
        // The final byte is reported once the server has accepted the object
        let chunk_progress = progress.clone();
        let chunks = futures_util::stream::iter((0..body.len()).step_by(UPLOAD_CHUNK_SIZE).map(
            move |start| {
                let end = std::cmp::min(start + UPLOAD_CHUNK_SIZE, body.len());
                let chunk = body[start..end].to_vec();
                chunk_progress((end as u64).min(total.saturating_sub(1)), total);
                Ok::<Vec<u8>, std::io::Error>(chunk)
            },
        ));

        let mut request = self.http.put(presigned.uri()).header(CONTENT_LENGTH, total);
        for (name, value) in presigned.headers() {
            request = request.header(name, value);
        }

        let response = request
            .body(reqwest::Body::wrap_stream(chunks))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status, text));
        }

        progress(total, total);
        Ok(())
    }

    async fn download_url(&self, key: &str) -> Result<String, TransportError> {
        // The object must exist before a URL is handed out
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match from_sdk_error(e) {
                TransportError::NotFound(_) => TransportError::NotFound(key.to_string()),
                other => other,
            })?;

        if let Some(domain) = &self.public_domain {
            let domain = domain
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/');
            return Ok(format!("https://{}/{}", domain, encode_key_path(key)));
        }

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(self.presigning_config()?)
            .await
            .map_err(from_sdk_error)?;

        Ok(presigned.uri().to_string())
    }

    async fn delete_object(&self, key: &str) -> Result<(), TransportError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(from_sdk_error)?;
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObject>, TransportError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(from_sdk_error)?;

            objects.extend(response.contents().iter().filter_map(|obj| {
                let key = obj.key()?.to_string();
                // Skip directory markers
                if key.ends_with('/') {
                    return None;
                }
                Some(RemoteObject {
                    key,
                    size: obj.size().unwrap_or(0),
                    last_modified: obj
                        .last_modified()
                        .map(|dt| dt.to_string())
                        .unwrap_or_default(),
                })
            }));

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(objects)
    }
}
