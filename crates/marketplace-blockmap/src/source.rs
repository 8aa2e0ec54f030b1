//! Lazy, single-pass source of missing chunk bytes.
//!
//! [`ChunkDataSource`] walks the diff plan through a [`RangeBatcher`] and only
//! talks to the network when its buffered batch runs dry. Each call to
//! [`ChunkSource::next_chunk`] therefore awaits I/O on batch boundaries only.

use crate::batch::{RangeBatch, RangeBatcher};
use crate::chunk::Chunk;
use crate::error::{BlockMapError, Result};
use crate::multipart::read_range_response;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use tokio::io::AsyncBufRead;

/// Response to a range batch request, as seen by the parser.
pub struct RangeResponse {
    /// HTTP status code
    pub status: u16,
    /// Value of the `Content-Type` header, if present
    pub content_type: Option<String>,
    /// Response body
    pub body: Box<dyn AsyncBufRead + Send + Unpin>,
}

impl fmt::Debug for RangeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Issues the HTTP request for one range batch.
///
/// Implementations send `GET <artifact>` with `Range: <batch.header>` and
/// hand back the raw response. Transport failures map to
/// [`BlockMapError::Fetch`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Requests the ranges of `batch`.
    async fn fetch(&self, batch: &RangeBatch) -> Result<RangeResponse>;
}

/// Pull-based sequence of chunk payloads.
#[async_trait]
pub trait ChunkSource: Send {
    /// Returns the next chunk, or `None` once the sequence is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Chunk payloads for a diff plan, fetched batch by batch on demand.
///
/// The source is finite and cannot be restarted. A retry needs a new
/// instance.
///
/// # Examples
///
/// ```no_run
/// use marketplace_blockmap::{ChunkDataSource, ChunkSource, RangeFetcher, diff, BlockMap};
///
/// # async fn run(fetcher: impl RangeFetcher, old: BlockMap, new: BlockMap) -> marketplace_blockmap::Result<()> {
/// let mut source = ChunkDataSource::new(fetcher, diff(&old, &new));
/// while let Some(bytes) = source.next_chunk().await? {
///     println!("got {} bytes", bytes.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChunkDataSource<F> {
    fetcher: F,
    batcher: RangeBatcher<std::vec::IntoIter<Chunk>>,
    buffered: VecDeque<Vec<u8>>,
    exhausted: bool,
    batches_fetched: usize,
}

impl<F> fmt::Debug for ChunkDataSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkDataSource")
            .field("buffered", &self.buffered.len())
            .field("exhausted", &self.exhausted)
            .field("batches_fetched", &self.batches_fetched)
            .finish_non_exhaustive()
    }
}

impl<F: RangeFetcher> ChunkDataSource<F> {
    /// Creates a source for the given missing chunks with default batch limits.
    #[must_use]
    pub fn new(fetcher: F, missing: Vec<Chunk>) -> Self {
        Self::with_batcher(fetcher, RangeBatcher::new(missing))
    }

    /// Creates a source over a preconfigured batcher.
    #[must_use]
    pub fn with_batcher(fetcher: F, batcher: RangeBatcher<std::vec::IntoIter<Chunk>>) -> Self {
        Self {
            fetcher,
            batcher,
            buffered: VecDeque::new(),
            exhausted: false,
            batches_fetched: 0,
        }
    }

    /// Number of range requests issued so far.
    #[must_use]
    pub const fn batches_fetched(&self) -> usize {
        self.batches_fetched
    }

    async fn fill(&mut self) -> Result<()> {
        let batch = self.batcher.next_batch();
        if batch.is_empty() {
            self.exhausted = true;
            return Ok(());
        }

        let response = self.fetcher.fetch(&batch).await?;
        let RangeResponse {
            status,
            content_type,
            mut body,
        } = response;

        let chunks = read_range_response(status, content_type.as_deref(), &mut body, &batch)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    range = %batch.header,
                    content_type = content_type.as_deref().unwrap_or("<none>"),
                    error = %e,
                    "range response rejected"
                );
            })?;

        self.batches_fetched += 1;
        self.buffered.extend(chunks);
        Ok(())
    }
}

#[async_trait]
impl<F: RangeFetcher> ChunkSource for ChunkDataSource<F> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(chunk) = self.buffered.pop_front() {
                return Ok(Some(chunk));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fill().await?;
        }
    }
}

#[async_trait]
impl ChunkSource for VecDeque<Vec<u8>> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.pop_front())
    }
}

/// Maps any transport error into [`BlockMapError::Fetch`].
pub fn fetch_error<E>(error: E) -> BlockMapError
where
    E: std::error::Error + Send + Sync + 'static,
{
    BlockMapError::Fetch(Box::new(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn plain_response(data: Vec<u8>) -> RangeResponse {
        RangeResponse {
            status: 206,
            content_type: Some("application/zip".to_string()),
            body: Box::new(std::io::Cursor::new(data)),
        }
    }

    #[tokio::test]
    async fn test_no_request_for_empty_plan() {
        let mut fetcher = MockRangeFetcher::new();
        fetcher.expect_fetch().never();

        let mut source = ChunkDataSource::new(fetcher, Vec::new());
        assert!(source.next_chunk().await.unwrap().is_none());
        assert!(source.next_chunk().await.unwrap().is_none());
        assert_eq!(source.batches_fetched(), 0);
    }

    #[tokio::test]
    async fn test_fetches_lazily_per_batch() {
        let requested = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requested);

        let mut fetcher = MockRangeFetcher::new();
        fetcher.expect_fetch().times(2).returning(move |batch| {
            log.lock().unwrap().push(batch.header.clone());
            let fill = u8::try_from(batch.parts[0].start / 100).unwrap();
            Ok(plain_response(vec![fill; 10]))
        });

        let missing = vec![Chunk::new(0, 10, vec![1]), Chunk::new(100, 10, vec![2])];
        let batcher = RangeBatcher::with_limits(missing, 1000, 10);
        let mut source = ChunkDataSource::with_batcher(fetcher, batcher);

        assert_eq!(source.next_chunk().await.unwrap(), Some(vec![0; 10]));
        assert_eq!(requested.lock().unwrap().len(), 1);

        assert_eq!(source.next_chunk().await.unwrap(), Some(vec![1; 10]));
        assert_eq!(requested.lock().unwrap().len(), 2);

        assert!(source.next_chunk().await.unwrap().is_none());
        assert_eq!(
            *requested.lock().unwrap(),
            vec!["bytes=0-9".to_string(), "bytes=100-109".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let mut fetcher = MockRangeFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Err(fetch_error(std::io::Error::other("reset"))));

        let mut source = ChunkDataSource::new(fetcher, vec![Chunk::new(0, 4, vec![1])]);
        let err = source.next_chunk().await.unwrap_err();
        assert!(matches!(err, BlockMapError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_parse_error_propagates() {
        let mut fetcher = MockRangeFetcher::new();
        fetcher.expect_fetch().returning(|_| {
            Ok(RangeResponse {
                status: 200,
                content_type: Some("application/zip".to_string()),
                body: Box::new(std::io::Cursor::new(vec![0; 4])),
            })
        });

        let mut source = ChunkDataSource::new(fetcher, vec![Chunk::new(0, 4, vec![1])]);
        let err = source.next_chunk().await.unwrap_err();
        assert!(err.is_malformed_response());
    }

    #[tokio::test]
    async fn test_vecdeque_source() {
        let mut source: VecDeque<Vec<u8>> = VecDeque::from(vec![vec![1], vec![2]]);
        assert_eq!(source.next_chunk().await.unwrap(), Some(vec![1]));
        assert_eq!(source.next_chunk().await.unwrap(), Some(vec![2]));
        assert_eq!(source.next_chunk().await.unwrap(), None);
    }
}
