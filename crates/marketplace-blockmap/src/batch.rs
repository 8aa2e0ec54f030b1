//! Grouping of missing chunks into HTTP `Range` requests.
//!
//! Adjacent chunks are coalesced into one byte range. A batch ends when the
//! next range would push the header past [`MAX_HTTP_HEADERS_LENGTH`] or the
//! payload past [`MAX_RANGE_BYTES`]. Every batch carries at least one chunk,
//! so progress is guaranteed even for a chunk larger than the byte cap.

use crate::chunk::Chunk;
use std::fmt::Write as _;
use std::iter::Peekable;

/// Longest `Range` header value a batch may produce.
///
/// CDNs commonly cap the whole request at 20 480 bytes; this leaves room for
/// the request line and the other headers.
pub const MAX_HTTP_HEADERS_LENGTH: usize = 19_500;

/// Largest payload a single batch may request.
pub const MAX_RANGE_BYTES: u64 = 10_000_000;

const RANGE_PREFIX: &str = "bytes=";

/// One contiguous byte range of a batch and the chunks it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePart {
    /// First byte of the range
    pub start: u64,
    /// Last byte of the range, inclusive
    pub end: u64,
    /// Lengths of the chunks packed in this range, in order
    pub chunk_lengths: Vec<u32>,
}

impl RangePart {
    /// Number of bytes covered by the range.
    #[must_use]
    pub const fn byte_len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// One HTTP request's worth of byte ranges.
///
/// Receiving `total_bytes()` bytes from a response to `header` yields the
/// batch's chunks in the same order they were planned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeBatch {
    /// Value for the `Range` request header, e.g. `bytes=0-99,200-299`
    pub header: String,
    /// Ranges in request order
    pub parts: Vec<RangePart>,
}

impl RangeBatch {
    /// Returns `true` when there was nothing left to request.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Lengths of every chunk in the batch, in order.
    pub fn chunk_lengths(&self) -> impl Iterator<Item = u32> + '_ {
        self.parts.iter().flat_map(|p| p.chunk_lengths.iter().copied())
    }

    /// Number of chunks in the batch.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.parts.iter().map(|p| p.chunk_lengths.len()).sum()
    }

    /// Total payload bytes requested.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.parts.iter().map(RangePart::byte_len).sum()
    }
}

/// Pull-based batcher over a sequence of missing chunks.
///
/// # Examples
///
/// ```
/// use marketplace_blockmap::{Chunk, RangeBatcher};
///
/// let chunks = vec![
///     Chunk::new(0, 100, vec![1]),
///     Chunk::new(100, 50, vec![2]),
///     Chunk::new(400, 10, vec![3]),
/// ];
/// let mut batcher = RangeBatcher::new(chunks);
///
/// let batch = batcher.next_batch();
/// assert_eq!(batch.header, "bytes=0-149,400-409");
/// assert_eq!(batch.chunk_lengths().collect::<Vec<_>>(), vec![100, 50, 10]);
///
/// assert!(batcher.next_batch().is_empty());
/// ```
#[derive(Debug)]
pub struct RangeBatcher<I: Iterator<Item = Chunk>> {
    chunks: Peekable<I>,
    max_header_len: usize,
    max_bytes: u64,
}

impl<I: Iterator<Item = Chunk>> RangeBatcher<I> {
    /// Creates a batcher with the default header and payload limits.
    pub fn new<T>(chunks: T) -> Self
    where
        T: IntoIterator<Item = Chunk, IntoIter = I>,
    {
        Self::with_limits(chunks, MAX_HTTP_HEADERS_LENGTH, MAX_RANGE_BYTES)
    }

    /// Creates a batcher with custom limits.
    pub fn with_limits<T>(chunks: T, max_header_len: usize, max_bytes: u64) -> Self
    where
        T: IntoIterator<Item = Chunk, IntoIter = I>,
    {
        Self {
            chunks: chunks.into_iter().peekable(),
            max_header_len,
            max_bytes,
        }
    }

    /// Takes the next batch off the chunk sequence.
    ///
    /// Returns an empty batch once the sequence is exhausted.
    pub fn next_batch(&mut self) -> RangeBatch {
        let mut parts: Vec<RangePart> = Vec::new();
        let mut header_len = RANGE_PREFIX.len();
        let mut bytes = 0u64;

        while let Some(chunk) = self.chunks.peek() {
            if chunk.length == 0 {
                self.chunks.next();
                continue;
            }

            let length = u64::from(chunk.length);
            if !parts.is_empty() && bytes + length > self.max_bytes {
                break;
            }

            let chunk_end = chunk.end() - 1;
            match parts.last_mut() {
                Some(last) if last.end + 1 == chunk.offset => {
                    let grown = header_len - digits(last.end) + digits(chunk_end);
                    if grown > self.max_header_len {
                        break;
                    }
                    header_len = grown;
                    last.end = chunk_end;
                    last.chunk_lengths.push(chunk.length);
                }
                _ => {
                    let separator = usize::from(!parts.is_empty());
                    let grown = header_len + separator + digits(chunk.offset) + 1 + digits(chunk_end);
                    if !parts.is_empty() && grown > self.max_header_len {
                        break;
                    }
                    header_len = grown;
                    parts.push(RangePart {
                        start: chunk.offset,
                        end: chunk_end,
                        chunk_lengths: vec![chunk.length],
                    });
                }
            }

            bytes += length;
            self.chunks.next();
        }

        if parts.is_empty() {
            return RangeBatch::default();
        }

        let mut header = String::with_capacity(header_len);
        header.push_str(RANGE_PREFIX);
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                header.push(',');
            }
            let _ = write!(header, "{}-{}", part.start, part.end);
        }

        tracing::debug!(
            ranges = parts.len(),
            bytes,
            header_len = header.len(),
            "prepared range batch"
        );
        RangeBatch { header, parts }
    }
}

impl<I: Iterator<Item = Chunk>> Iterator for RangeBatcher<I> {
    type Item = RangeBatch;

    fn next(&mut self) -> Option<RangeBatch> {
        let batch = self.next_batch();
        (!batch.is_empty()).then_some(batch)
    }
}

const fn digits(mut n: u64) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(offset: u64, length: u32) -> Chunk {
        Chunk::new(offset, length, offset.to_le_bytes().to_vec())
    }

    #[test]
    fn test_digits() {
        assert_eq!(digits(0), 1);
        assert_eq!(digits(9), 1);
        assert_eq!(digits(10), 2);
        assert_eq!(digits(u64::MAX), 20);
    }

    #[test]
    fn test_empty_input_gives_empty_batch() {
        let mut batcher = RangeBatcher::new(Vec::new());
        let batch = batcher.next_batch();
        assert!(batch.is_empty());
        assert_eq!(batch.header, "");
        assert!(batcher.next().is_none());
    }

    #[test]
    fn test_adjacent_chunks_are_coalesced() {
        let mut batcher = RangeBatcher::new(vec![chunk(0, 10), chunk(10, 10), chunk(20, 5)]);
        let batch = batcher.next_batch();

        assert_eq!(batch.header, "bytes=0-24");
        assert_eq!(batch.parts.len(), 1);
        assert_eq!(batch.parts[0].chunk_lengths, vec![10, 10, 5]);
        assert_eq!(batch.total_bytes(), 25);
    }

    #[test]
    fn test_gaps_start_new_ranges() {
        let mut batcher = RangeBatcher::new(vec![chunk(0, 10), chunk(11, 10), chunk(30, 5)]);
        let batch = batcher.next_batch();
        assert_eq!(batch.header, "bytes=0-9,11-20,30-34");
        assert_eq!(batch.chunk_count(), 3);
    }

    #[test]
    fn test_header_limit_splits_batches() {
        let chunks: Vec<Chunk> = (0..5000).map(|i| chunk(i * 1000, 100)).collect();
        let batches: Vec<RangeBatch> = RangeBatcher::new(chunks.clone()).collect();

        assert!(batches.len() > 1);
        for batch in &batches {
            assert!(batch.header.len() <= MAX_HTTP_HEADERS_LENGTH);
        }
        let total: usize = batches.iter().map(RangeBatch::chunk_count).sum();
        assert_eq!(total, chunks.len());
    }

    #[test]
    fn test_header_length_tracks_serialized_value() {
        let chunks: Vec<Chunk> = (0..300).map(|i| chunk(i * 997, 13)).collect();
        for batch in RangeBatcher::with_limits(chunks, 200, u64::MAX) {
            assert!(batch.header.len() <= 200, "{}", batch.header);
            assert!(batch.header.starts_with("bytes="));
        }
    }

    #[test]
    fn test_byte_cap_splits_adjacent_run() {
        let chunks: Vec<Chunk> = (0..10).map(|i| chunk(i * 100, 100)).collect();
        let batches: Vec<RangeBatch> =
            RangeBatcher::with_limits(chunks, MAX_HTTP_HEADERS_LENGTH, 350).collect();

        let headers: Vec<&str> = batches.iter().map(|b| b.header.as_str()).collect();
        assert_eq!(
            headers,
            vec!["bytes=0-299", "bytes=300-599", "bytes=600-899", "bytes=900-999"]
        );
    }

    #[test]
    fn test_oversized_chunk_still_progresses() {
        let mut batcher = RangeBatcher::with_limits(vec![chunk(0, 500), chunk(500, 1)], 100, 10);
        assert_eq!(batcher.next_batch().header, "bytes=0-499");
        assert_eq!(batcher.next_batch().header, "bytes=500-500");
        assert!(batcher.next_batch().is_empty());
    }

    #[test]
    fn test_order_preserved_across_batches() {
        let chunks: Vec<Chunk> = (0..100).map(|i| chunk(i * 50, 10)).collect();
        let offsets: Vec<u64> = RangeBatcher::with_limits(chunks.clone(), 60, u64::MAX)
            .flat_map(|b| b.parts.into_iter().map(|p| p.start))
            .collect();
        let expected: Vec<u64> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, expected);
    }

    #[test]
    fn test_zero_length_chunks_are_skipped() {
        let mut batcher = RangeBatcher::new(vec![chunk(0, 0), chunk(0, 4)]);
        let batch = batcher.next_batch();
        assert_eq!(batch.header, "bytes=0-3");
        assert_eq!(batch.chunk_lengths().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_coalesced_and_split_request_same_bytes() {
        let chunks: Vec<Chunk> = (0..20).map(|i| chunk(i * 10, 10)).collect();
        let coalesced: u64 = RangeBatcher::new(chunks.clone())
            .map(|b| b.total_bytes())
            .sum();
        let split: u64 = RangeBatcher::with_limits(chunks, MAX_HTTP_HEADERS_LENGTH, 10)
            .map(|b| b.total_bytes())
            .sum();
        assert_eq!(coalesced, split);
        assert_eq!(coalesced, 200);
    }
}
