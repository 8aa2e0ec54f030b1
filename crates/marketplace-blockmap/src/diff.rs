//! Chunk-diff planning between two block maps.

use crate::blockmap::BlockMap;
use crate::chunk::Chunk;

/// Returns the chunks of `new` whose content is absent from `old`.
///
/// Order follows `new`, and duplicates within `new` are kept. Chunks are
/// matched on `(checksum, length)` only.
///
/// # Examples
///
/// ```
/// use marketplace_blockmap::{BlockMap, ChunkingParams, diff};
///
/// let map = BlockMap::from_reader(&b"same bytes"[..], ChunkingParams::default()).unwrap();
/// assert!(diff(&map, &map).is_empty());
///
/// let empty = BlockMap::empty(ChunkingParams::default());
/// assert_eq!(diff(&empty, &map), map.chunks);
/// ```
#[must_use]
pub fn diff(old: &BlockMap, new: &BlockMap) -> Vec<Chunk> {
    let known = old.chunk_set();
    new.chunks
        .iter()
        .filter(|chunk| !known.contains(chunk))
        .cloned()
        .collect()
}

/// Share of the new file's bytes that a delta download would fetch.
///
/// Returns `0.0` when `new` describes an empty file.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn download_fraction(missing: &[Chunk], new: &BlockMap) -> f64 {
    let total = new.total_size();
    if total == 0 {
        return 0.0;
    }
    let missing_bytes: u64 = missing.iter().map(|c| u64::from(c.length)).sum();
    missing_bytes as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockmap::ChunkingParams;

    fn chunk(offset: u64, length: u32, id: u8) -> Chunk {
        Chunk::new(offset, length, vec![id; 4])
    }

    fn map(chunks: Vec<Chunk>) -> BlockMap {
        BlockMap {
            chunks,
            ..BlockMap::empty(ChunkingParams::default())
        }
    }

    #[test]
    fn test_diff_of_identical_maps_is_empty() {
        let m = map(vec![chunk(0, 10, 1), chunk(10, 20, 2), chunk(30, 5, 3)]);
        assert!(diff(&m, &m).is_empty());
    }

    #[test]
    fn test_diff_against_empty_is_everything() {
        let new = map(vec![chunk(0, 10, 1), chunk(10, 20, 2)]);
        let old = BlockMap::empty(ChunkingParams::default());
        assert_eq!(diff(&old, &new), new.chunks);
    }

    #[test]
    fn test_diff_keeps_new_order_and_offsets() {
        let old = map(vec![chunk(0, 10, 1), chunk(10, 10, 2)]);
        let new = map(vec![
            chunk(0, 10, 9),
            chunk(10, 10, 1),
            chunk(20, 10, 8),
            chunk(30, 10, 2),
        ]);

        let missing = diff(&old, &new);
        let offsets: Vec<u64> = missing.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 20]);
    }

    #[test]
    fn test_diff_matches_moved_content() {
        let old = map(vec![chunk(0, 10, 1), chunk(10, 10, 2)]);
        let new = map(vec![chunk(0, 10, 2), chunk(10, 10, 1)]);
        assert!(diff(&old, &new).is_empty());
    }

    #[test]
    fn test_diff_keeps_duplicates_of_new() {
        let old = map(vec![chunk(0, 10, 1)]);
        let new = map(vec![chunk(0, 10, 7), chunk(10, 10, 7), chunk(20, 10, 1)]);
        assert_eq!(diff(&old, &new).len(), 2);
    }

    #[test]
    fn test_diff_distinguishes_length() {
        let old = map(vec![chunk(0, 10, 1)]);
        let new = map(vec![chunk(0, 11, 1)]);
        assert_eq!(diff(&old, &new).len(), 1);
    }

    #[test]
    fn test_download_fraction() {
        let new = map(vec![chunk(0, 25, 1), chunk(25, 75, 2)]);
        let missing = vec![chunk(0, 25, 1)];
        assert!((download_fraction(&missing, &new) - 0.25).abs() < f64::EPSILON);
        assert!((download_fraction(&new.chunks, &new) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_download_fraction_of_empty_file() {
        let new = BlockMap::empty(ChunkingParams::default());
        assert!(download_fraction(&[], &new).abs() < f64::EPSILON);
    }
}
