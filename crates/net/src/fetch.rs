//! Artifact fetching with progress and cancellation

use crate::client::NetClient;
use async_trait::async_trait;
use futures::StreamExt;
use pkgd_errors::{Error, NetworkError};
use pkgd_platform::CancellationGate;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

const COPY_CHUNK: usize = 64 * 1024;

/// One artifact to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub destination: PathBuf,
}

impl FetchRequest {
    #[must_use]
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
        }
    }
}

/// A completed fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub path: PathBuf,
    pub size: u64,
    /// Hex BLAKE3 digest of the fetched bytes
    pub digest: String,
}

/// Fetches artifacts for the download phase
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch one artifact.
    ///
    /// `progress` receives the in-item percentage (0..=100). A cancel
    /// requested on the gate, including while waiting on the remote end,
    /// stops the fetch with `NetworkError::Cancelled` and removes the
    /// partial file.
    ///
    /// # Errors
    ///
    /// Returns a network or I/O error if the artifact cannot be fetched.
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &mut (dyn FnMut(f64) + Send),
        gate: &CancellationGate,
    ) -> Result<FetchResult, Error>;
}

/// Fetches `http`, `https` and `file` URLs
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: NetClient,
}

impl HttpFetcher {
    #[must_use]
    pub fn new(client: NetClient) -> Self {
        Self { client }
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self, Error> {
        Ok(Self::new(NetClient::with_defaults()?))
    }

    async fn fetch_http(
        &self,
        url: &str,
        out: &mut Partial,
        progress: &mut (dyn FnMut(f64) + Send),
        gate: &CancellationGate,
    ) -> Result<(), Error> {
        let response = tokio::select! {
            () = gate.cancelled() => return Err(NetworkError::Cancelled.into()),
            response = self.client.get(url) => response?,
        };
        let total = response.content_length().filter(|t| *t > 0);
        let chunk_timeout = self.client.config().chunk_timeout;
        let mut stream = response.bytes_stream();

        loop {
            if gate.check_cancelled() {
                return Err(NetworkError::Cancelled.into());
            }
            let next = tokio::select! {
                () = gate.cancelled() => return Err(NetworkError::Cancelled.into()),
                next = tokio::time::timeout(chunk_timeout, stream.next()) => next,
            };
            let chunk = match next {
                Ok(Some(chunk)) => chunk.map_err(|e| NetworkError::DownloadFailed(e.to_string()))?,
                Ok(None) => break,
                Err(_) => {
                    return Err(NetworkError::Timeout {
                        url: url.to_string(),
                    }
                    .into())
                }
            };
            out.write(&chunk).await?;
            if let Some(total) = total {
                progress(percent_of(out.size, total));
            }
        }
        Ok(())
    }

    async fn fetch_file(
        source: &Path,
        out: &mut Partial,
        progress: &mut (dyn FnMut(f64) + Send),
        gate: &CancellationGate,
    ) -> Result<(), Error> {
        let mut file = tokio::fs::File::open(source).await.map_err(|e| {
            NetworkError::DownloadFailed(format!("{}: {e}", source.display()))
        })?;
        let total = file.metadata().await?.len();
        let mut buffer = vec![0u8; COPY_CHUNK];

        loop {
            if gate.check_cancelled() {
                return Err(NetworkError::Cancelled.into());
            }
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            out.write(&buffer[..read]).await?;
            if total > 0 {
                progress(percent_of(out.size, total));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &mut (dyn FnMut(f64) + Send),
        gate: &CancellationGate,
    ) -> Result<FetchResult, Error> {
        let url = Url::parse(&request.url)
            .map_err(|e| NetworkError::InvalidUrl(format!("{}: {e}", request.url)))?;

        let mut out = Partial::create(&request.destination).await?;
        tracing::debug!(url = %url, dest = %request.destination.display(), "fetching");
        progress(0.0);

        let fetched = match url.scheme() {
            "http" | "https" => self.fetch_http(url.as_str(), &mut out, progress, gate).await,
            "file" => match url.to_file_path() {
                Ok(source) => Self::fetch_file(&source, &mut out, progress, gate).await,
                Err(()) => Err(NetworkError::InvalidUrl(request.url.clone()).into()),
            },
            other => Err(NetworkError::InvalidUrl(format!("unsupported scheme {other}")).into()),
        };

        match fetched {
            Ok(()) => {
                let result = out.finish().await?;
                progress(100.0);
                Ok(result)
            }
            Err(e) => {
                out.discard().await;
                Err(e)
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent_of(done: u64, total: u64) -> f64 {
    (done as f64 / total as f64 * 100.0).min(100.0)
}

/// Destination being written; renamed into place on success
struct Partial {
    path: PathBuf,
    final_path: PathBuf,
    file: tokio::fs::File,
    hasher: blake3::Hasher,
    size: u64,
}

impl Partial {
    async fn create(destination: &Path) -> Result<Self, Error> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }
        let mut name = destination.as_os_str().to_owned();
        name.push(".partial");
        let path = PathBuf::from(name);
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| Error::io_with_path(&e, &path))?;
        Ok(Self {
            path,
            final_path: destination.to_path_buf(),
            file,
            hasher: blake3::Hasher::new(),
            size: 0,
        })
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.hasher.update(chunk);
        self.file.write_all(chunk).await?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    async fn finish(mut self) -> Result<FetchResult, Error> {
        self.file.flush().await?;
        drop(self.file);
        tokio::fs::rename(&self.path, &self.final_path)
            .await
            .map_err(|e| Error::io_with_path(&e, &self.final_path))?;
        Ok(FetchResult {
            path: self.final_path,
            size: self.size,
            digest: self.hasher.finalize().to_hex().to_string(),
        })
    }

    async fn discard(self) {
        drop(self.file);
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::debug!(path = %self.path.display(), error = %e, "partial download already gone");
        }
    }
}
