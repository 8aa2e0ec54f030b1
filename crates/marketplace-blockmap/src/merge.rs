//! Reconstruction of a new file from an old file and fetched chunks.

use crate::blockmap::BlockMap;
use crate::chunk::Chunk;
use crate::error::{BlockMapError, Result};
use crate::source::ChunkSource;
use std::collections::HashMap;
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

/// Byte counts of a finished merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Bytes copied from the old file
    pub reused: u64,
    /// Bytes pulled from the chunk source
    pub fetched: u64,
}

impl MergeStats {
    /// Total bytes written to the output.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.reused + self.fetched
    }
}

/// Writes the file described by `new_map` to `output`.
///
/// Walks `new_map` in order. Chunks whose content appears in `old_map` are
/// copied from `old`; every other chunk is pulled from `source`, which must
/// yield them in the same order. Output is written sequentially.
///
/// # Errors
///
/// - [`BlockMapError::SourceExhausted`] if `source` ends early
/// - [`BlockMapError::ChunkLengthMismatch`] if a pulled chunk has the wrong size
/// - [`BlockMapError::SourceNotDrained`] if `source` has chunks left at the end
/// - any error raised by `source` itself
/// - [`BlockMapError::Io`] on read, seek, or write failures
///
/// # Examples
///
/// ```
/// use marketplace_blockmap::{BlockMap, ChunkingParams, diff, merge};
/// use std::collections::VecDeque;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> marketplace_blockmap::Result<()> {
/// let old = b"hello world".to_vec();
/// let new = b"hello there".to_vec();
/// let old_map = BlockMap::from_reader(&old[..], ChunkingParams::default())?;
/// let new_map = BlockMap::from_reader(&new[..], ChunkingParams::default())?;
///
/// let mut source: VecDeque<Vec<u8>> = diff(&old_map, &new_map)
///     .iter()
///     .map(|c| new[c.offset as usize..c.end() as usize].to_vec())
///     .collect();
///
/// let mut output = Vec::new();
/// let stats = merge(
///     &mut std::io::Cursor::new(old),
///     &old_map,
///     &new_map,
///     &mut source,
///     &mut output,
/// )
/// .await?;
/// assert_eq!(output, new);
/// assert_eq!(stats.total(), 11);
/// # Ok(())
/// # }
/// ```
pub async fn merge<R, W, S>(
    old: &mut R,
    old_map: &BlockMap,
    new_map: &BlockMap,
    source: &mut S,
    output: &mut W,
) -> Result<MergeStats>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    S: ChunkSource + ?Sized,
{
    let mut known: HashMap<&Chunk, u64> = HashMap::with_capacity(old_map.chunks.len());
    for chunk in &old_map.chunks {
        known.entry(chunk).or_insert(chunk.offset);
    }

    let mut stats = MergeStats::default();
    let mut buf = Vec::new();
    let mut position: Option<u64> = None;

    for chunk in &new_map.chunks {
        if chunk.length == 0 {
            continue;
        }

        if let Some(&offset) = known.get(chunk) {
            if position != Some(offset) {
                old.seek(SeekFrom::Start(offset)).await?;
            }
            buf.resize(chunk.length as usize, 0);
            old.read_exact(&mut buf).await?;
            output.write_all(&buf).await?;
            position = Some(offset + u64::from(chunk.length));
            stats.reused += u64::from(chunk.length);
        } else {
            let data = source
                .next_chunk()
                .await?
                .ok_or(BlockMapError::SourceExhausted {
                    offset: chunk.offset,
                })?;
            if data.len() != chunk.length as usize {
                return Err(BlockMapError::ChunkLengthMismatch {
                    offset: chunk.offset,
                    expected: chunk.length,
                    actual: data.len(),
                });
            }
            output.write_all(&data).await?;
            stats.fetched += u64::from(chunk.length);
        }
    }

    if source.next_chunk().await?.is_some() {
        return Err(BlockMapError::SourceNotDrained);
    }

    output.flush().await?;
    tracing::debug!(
        reused = stats.reused,
        fetched = stats.fetched,
        "merged file from block maps"
    );
    Ok(stats)
}
