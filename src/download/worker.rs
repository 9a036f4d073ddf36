//! Save target writing into the downloads directory, with streaming for remote URLs

use super::trigger::{ObjectUrlRegistry, SaveTarget};
use super::types::{SavedFile, BLOB_SCHEME, WRITE_BUFFER_SIZE};
use crate::error::{DownloadError, TransportError};
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Saves documents the way a browser `<a download>` click would.
///
/// - `blob:` handles are read from the registry
/// - `http(s)://` URLs are streamed to disk
/// - anything else is a bundled asset path under `assets_dir`
#[derive(Clone)]
pub struct LinkSaver {
    client: Client,
    download_dir: PathBuf,
    assets_dir: PathBuf,
}

impl LinkSaver {
    pub fn new(
        client: Client,
        download_dir: impl Into<PathBuf>,
        assets_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            download_dir: download_dir.into(),
            assets_dir: assets_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Resolve a bundled asset href. Paths that could leave `assets_dir` are rejected.
    fn asset_path(&self, href: &str) -> Result<PathBuf, DownloadError> {
        let relative = href.trim_start_matches("./").trim_start_matches('/');
        let relative = Path::new(relative.split(['?', '#']).next().unwrap_or_default());
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(DownloadError::InvalidAssetPath(href.to_string()));
        }
        Ok(self.assets_dir.join(relative))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DownloadError + '_ {
    move |source| DownloadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl SaveTarget for LinkSaver {
    async fn save(
        &self,
        href: &str,
        filename: &str,
        blobs: &ObjectUrlRegistry,
    ) -> Result<SavedFile, DownloadError> {
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(io_error(&self.download_dir))?;
        let destination = self.download_dir.join(filename);

        let bytes = if href.starts_with(BLOB_SCHEME) {
            let data = blobs
                .resolve(href)
                .ok_or_else(|| DownloadError::HandleRevoked(href.to_string()))?;
            tokio::fs::write(&destination, data.as_slice())
                .await
                .map_err(io_error(&destination))?;
            data.len() as u64
        } else if href.starts_with("http://") || href.starts_with("https://") {
            stream_to_file(&self.client, href, &destination).await?
        } else {
            let asset = self.asset_path(href)?;
            if !tokio::fs::try_exists(&asset).await.unwrap_or(false) {
                return Err(DownloadError::AssetMissing(asset));
            }
            tokio::fs::copy(&asset, &destination)
                .await
                .map_err(io_error(&destination))?
        };

        log::info!("Saved {} ({} bytes)", destination.display(), bytes);
        Ok(SavedFile {
            filename: filename.to_string(),
            path: destination,
            bytes,
        })
    }
}

/// Stream a remote document to `destination` with buffered writes.
async fn stream_to_file(
    client: &Client,
    url: &str,
    destination: &Path,
) -> Result<u64, DownloadError> {
    let http_error = |source: TransportError| DownloadError::Http {
        url: url.to_string(),
        source,
    };

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| http_error(e.into()))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        return Err(http_error(TransportError::from_status(status, text)));
    }

    let total_bytes = response.content_length().unwrap_or(0);
    let chunks = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(TransportError::from));
    write_stream(chunks, url, destination, total_bytes).await
}

/// Write `chunks` to `destination` through a `.part` file that is renamed on
/// success and removed on failure.
async fn write_stream<S, B>(
    chunks: S,
    url: &str,
    destination: &Path,
    total_bytes: u64,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, TransportError>>,
    B: AsRef<[u8]>,
{
    let partial = partial_path(destination);
    match write_chunks(chunks, url, &partial, total_bytes).await {
        Ok(downloaded) => {
            tokio::fs::rename(&partial, destination)
                .await
                .map_err(io_error(destination))?;
            Ok(downloaded)
        }
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to remove {}: {}", partial.display(), cleanup);
                }
            }
            Err(e)
        }
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

async fn write_chunks<S, B>(
    chunks: S,
    url: &str,
    path: &Path,
    total_bytes: u64,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, TransportError>>,
    B: AsRef<[u8]>,
{
    futures_util::pin_mut!(chunks);
    let mut file = File::create(path).await.map_err(io_error(path))?;
    let mut write_buffer = Vec::with_capacity(WRITE_BUFFER_SIZE.min(total_bytes.max(1) as usize));
    let mut downloaded: u64 = 0;

    while let Some(chunk_result) = chunks.next().await {
        let chunk = chunk_result.map_err(|source| DownloadError::Http {
            url: url.to_string(),
            source,
        })?;
        let chunk = chunk.as_ref();
        write_buffer.extend_from_slice(chunk);
        downloaded += chunk.len() as u64;

        if write_buffer.len() >= WRITE_BUFFER_SIZE {
            file.write_all(&write_buffer).await.map_err(io_error(path))?;
            write_buffer.clear();
            log::debug!("Downloaded {}/{} bytes of {}", downloaded, total_bytes, url);
        }
    }

    // Flush remaining buffer
    if !write_buffer.is_empty() {
        file.write_all(&write_buffer).await.map_err(io_error(path))?;
    }
    file.flush().await.map_err(io_error(path))?;

    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{DownloadSource, DownloadTrigger};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn saver(dir: &tempfile::TempDir) -> LinkSaver {
        LinkSaver::new(Client::new(), dir.path().join("downloads"), dir.path().join("site"))
    }

    #[tokio::test]
    async fn blob_is_written_to_download_dir() {
        let dir = tempfile::tempdir().unwrap();
        let trigger = DownloadTrigger::new(saver(&dir));

        let saved = trigger
            .trigger_download(DownloadSource::blob(b"%PDF-1.4 local".to_vec(), "../Jane.pdf"))
            .await
            .unwrap();

        assert_eq!(saved.path, dir.path().join("downloads").join("Jane.pdf"));
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"%PDF-1.4 local");
        assert_eq!(trigger.registry().outstanding(), 0);
    }

    #[tokio::test]
    async fn remote_url_is_streamed() {
        let server = MockServer::start().await;
        let body = vec![7u8; 3 * 1024 * 1024];
        Mock::given(method("GET"))
            .and(path("/files/cv.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let trigger = DownloadTrigger::new(saver(&dir));
        let saved = trigger
            .trigger_download(DownloadSource::url(format!("{}/files/cv.pdf?v=1", server.uri())))
            .await
            .unwrap();

        assert_eq!(saved.filename, "cv.pdf");
        assert_eq!(saved.bytes, body.len() as u64);
        assert_eq!(std::fs::read(&saved.path).unwrap(), body);
    }

    #[tokio::test]
    async fn remote_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/missing.pdf", server.uri());
        let err = saver(&dir)
            .save(&url, "missing.pdf", &ObjectUrlRegistry::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DownloadError::Http {
                source: TransportError::NotFound(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn bundled_asset_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let asset_dir = dir.path().join("site").join("assets").join("cv");
        std::fs::create_dir_all(&asset_dir).unwrap();
        std::fs::write(asset_dir.join("cv.pdf"), b"%PDF bundled").unwrap();

        let trigger = DownloadTrigger::new(saver(&dir));
        let saved = trigger
            .trigger_download(DownloadSource::url("assets/cv/cv.pdf"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(saved.path).unwrap(), b"%PDF bundled");

        let missing = trigger
            .trigger_download(DownloadSource::url("assets/cv/other.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(missing, DownloadError::AssetMissing(_)));
    }

    #[tokio::test]
    async fn asset_outside_assets_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("site")).unwrap();
        std::fs::write(dir.path().join("secret.pdf"), b"%PDF private").unwrap();

        let trigger = DownloadTrigger::new(saver(&dir));
        let err = trigger
            .trigger_download(DownloadSource::url("../secret.pdf"))
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::InvalidAssetPath(_)));
        assert!(!dir.path().join("downloads").join("secret.pdf").exists());
    }

    #[tokio::test]
    async fn interrupted_stream_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("cv.pdf");
        let chunks = futures_util::stream::iter(vec![
            Ok(vec![1u8; 1024]),
            Err(TransportError::Network("connection reset".into())),
        ]);

        let err = write_stream(chunks, "https://example.com/cv.pdf", &destination, 4096)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DownloadError::Http {
                source: TransportError::Network(_),
                ..
            }
        ));
        assert!(!destination.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn revoked_handle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = saver(&dir)
            .save("blob:cv-vault/99", "cv.pdf", &ObjectUrlRegistry::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HandleRevoked(_)));
    }
}
