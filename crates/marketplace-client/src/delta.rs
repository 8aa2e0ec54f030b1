//! Block-map delta download.
//!
//! [`DeltaDownloader::download`] runs one attempt:
//!
//! ```text
//! fetch sidecars ─► old block map ─► savings check ─► merge into .part
//!                                                          │
//!                          commit ◄─ hash matches ◄────────┘
//! ```
//!
//! Any error leaves no file behind. Whether to fall back to a full download
//! is the caller's decision.

use crate::artifact::ArtifactLocation;
use crate::download::{Download, DownloadMethod};
use crate::error::{ClientError, Result};
use crate::partial::PartialFile;
use crate::transport::{HttpRequest, Transport};
use async_trait::async_trait;
use marketplace_blockmap::{
    BlockMap, ChunkDataSource, FileHash, RangeBatch, RangeFetcher, RangeResponse, diff,
    download_fraction, fetch_error, merge,
};
use reqwest::Url;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{BufReader, BufWriter};

/// Upper bound on sidecar sizes.
const SIDECAR_LIMIT: u64 = 64 * 1024 * 1024;

/// Issues range batches for one artifact through a [`Transport`].
pub struct TransportRangeFetcher {
    transport: Arc<dyn Transport>,
    url: Url,
    requests: Arc<AtomicUsize>,
}

impl fmt::Debug for TransportRangeFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRangeFetcher")
            .field("url", &self.url.as_str())
            .field("requests", &self.requests.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TransportRangeFetcher {
    /// Creates a fetcher for the artifact at `url`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, url: Url) -> Self {
        Self {
            transport,
            url,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of requests sent so far.
    #[must_use]
    pub fn request_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl RangeFetcher for TransportRangeFetcher {
    async fn fetch(&self, batch: &RangeBatch) -> marketplace_blockmap::Result<RangeResponse> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            url = %self.url,
            ranges = batch.parts.len(),
            chunks = batch.chunk_count(),
            bytes = batch.total_bytes(),
            "requesting range batch"
        );

        let request = HttpRequest::get(self.url.clone()).with_range(batch.header.clone());
        let response = self.transport.get(request).await.map_err(fetch_error)?;
        let content_type = response.content_type().map(str::to_owned);
        Ok(RangeResponse {
            status: response.status,
            content_type,
            body: response.body,
        })
    }
}

/// Runs block-map delta downloads against one transport.
pub struct DeltaDownloader {
    transport: Arc<dyn Transport>,
    max_download_fraction: f64,
}

impl fmt::Debug for DeltaDownloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeltaDownloader")
            .field("max_download_fraction", &self.max_download_fraction)
            .finish_non_exhaustive()
    }
}

impl DeltaDownloader {
    /// Creates a downloader that gives up when more than
    /// `max_download_fraction` of the new file would have to be fetched.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, max_download_fraction: f64) -> Self {
        Self {
            transport,
            max_download_fraction,
        }
    }

    /// Rebuilds the artifact at `location` into `target` from `old_file`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::OldFileMissing`] if `old_file` is not a file
    /// - [`ClientError::MetadataUnavailable`] if a sidecar is missing or invalid
    /// - [`ClientError::UnfavorableSavings`] if too much would be fetched
    /// - [`ClientError::HashMismatch`] if the result fails verification
    /// - [`ClientError::BlockMap`] for range and merge failures
    pub async fn download(
        &self,
        location: &ArtifactLocation,
        old_file: &Path,
        target: &Path,
    ) -> Result<Download> {
        ensure_old_file(old_file).await?;

        let new_map = self.fetch_block_map(location).await?;
        let expected = self.fetch_hash(location).await?;

        let old_path = old_file.to_path_buf();
        let params = new_map.params();
        let old_map =
            tokio::task::spawn_blocking(move || BlockMap::from_file(&old_path, params)).await??;

        let missing = diff(&old_map, &new_map);
        let fraction = download_fraction(&missing, &new_map);
        tracing::info!(
            file = location.file_name(),
            missing_chunks = missing.len(),
            total_chunks = new_map.chunks.len(),
            download_percent = fraction * 100.0,
            "computed delta"
        );
        if fraction > self.max_download_fraction {
            return Err(ClientError::UnfavorableSavings {
                fraction,
                threshold: self.max_download_fraction,
            });
        }

        let fetcher =
            TransportRangeFetcher::new(Arc::clone(&self.transport), location.artifact_url().clone());
        let requests = fetcher.request_counter();
        let mut source = ChunkDataSource::new(fetcher, missing);

        let (partial, file) = PartialFile::create(target).await?;
        let mut old = BufReader::new(tokio::fs::File::open(old_file).await?);
        let mut output = BufWriter::new(file);
        let stats = merge(&mut old, &old_map, &new_map, &mut source, &mut output).await?;
        drop(output);

        let reader = tokio::fs::File::open(partial.path()).await?;
        let actual = FileHash::from_async_reader(expected.algorithm, reader).await?;
        if actual != expected {
            return Err(ClientError::HashMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        let path = partial.commit().await?;
        let range_requests = requests.load(Ordering::Relaxed);
        tracing::info!(
            path = %path.display(),
            reused = stats.reused,
            fetched = stats.fetched,
            range_requests,
            "downloaded via block map"
        );
        Ok(Download {
            path,
            size: stats.total(),
            method: DownloadMethod::Delta {
                reused: stats.reused,
                fetched: stats.fetched,
                range_requests,
                download_fraction: fraction,
            },
        })
    }

    async fn fetch_block_map(&self, location: &ArtifactLocation) -> Result<BlockMap> {
        let url = location.block_map_url();
        let bytes = self.fetch_sidecar(&url).await?;
        let map = BlockMap::from_zip(&bytes).map_err(|e| unavailable(&url, &e))?;
        map.validate().map_err(|e| unavailable(&url, &e))?;
        Ok(map)
    }

    async fn fetch_hash(&self, location: &ArtifactLocation) -> Result<FileHash> {
        let url = location.hash_url();
        let bytes = self.fetch_sidecar(&url).await?;
        FileHash::from_json(&bytes).map_err(|e| unavailable(&url, &e))
    }

    async fn fetch_sidecar(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self.transport.get(HttpRequest::get(url.clone())).await?;
        if !response.is_success() {
            return Err(ClientError::MetadataUnavailable {
                url: url.to_string(),
                reason: format!("HTTP status {}", response.status),
            });
        }
        response
            .bytes(SIDECAR_LIMIT)
            .await
            .map_err(|e| unavailable(url, &e))
    }
}

/// Checks that the old copy of an artifact exists.
///
/// # Errors
///
/// Returns [`ClientError::OldFileMissing`] unless `path` is a regular file.
pub async fn ensure_old_file(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(ClientError::OldFileMissing {
            path: path.to_path_buf(),
        }),
    }
}

fn unavailable(url: &Url, error: &dyn std::error::Error) -> ClientError {
    ClientError::MetadataUnavailable {
        url: url.to_string(),
        reason: error.to_string(),
    }
}
