//! Block maps: content-defined chunkings of a file.
//!
//! A [`BlockMap`] is built once per file version with FastCDC and never
//! mutated. Repositories publish it next to each artifact as a zip archive
//! holding a single `blockmap.json` entry.
//!
//! # Examples
//!
//! ```
//! use marketplace_blockmap::{BlockMap, ChunkingParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![42u8; 100_000];
//! let map = BlockMap::from_reader(&data[..], ChunkingParams::default())?;
//! assert_eq!(map.total_size(), 100_000);
//!
//! let archive = map.to_zip()?;
//! let restored = BlockMap::from_zip(&archive)?;
//! assert_eq!(restored.chunks, map.chunks);
//! # Ok(())
//! # }
//! ```

use crate::chunk::Chunk;
use crate::error::{BlockMapError, Result};
use crate::hash::HashAlgorithm;
use fastcdc::v2020::{
    AVERAGE_MAX, AVERAGE_MIN, MAXIMUM_MAX, MAXIMUM_MIN, MINIMUM_MAX, MINIMUM_MIN, StreamCDC,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the block map entry inside the sidecar archive.
pub const BLOCKMAP_FILENAME: &str = "blockmap.json";

/// Suffix appended to the artifact name for the block map sidecar.
pub const BLOCKMAP_ZIP_SUFFIX: &str = ".blockmap.zip";

/// Suffix appended to the artifact name for the hash sidecar.
pub const HASH_FILENAME_SUFFIX: &str = ".hash.json";

/// Parameters for content-defined chunking.
///
/// Sizes are in bytes. The defaults are SHA-256 chunk digests with
/// 2 KiB / 8 KiB / 64 KiB minimum, normal, and maximum chunk sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    /// Digest algorithm for chunk checksums
    pub algorithm: HashAlgorithm,
    /// Smallest chunk the chunker will cut
    pub min_size: u32,
    /// Target average chunk size
    pub normal_size: u32,
    /// Largest chunk the chunker will cut
    pub max_size: u32,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            min_size: 2 * 1024,
            normal_size: 8 * 1024,
            max_size: 64 * 1024,
        }
    }
}

impl ChunkingParams {
    /// Checks the sizes against the limits of the FastCDC implementation.
    ///
    /// # Errors
    ///
    /// Returns [`BlockMapError::InvalidChunkingParams`] if any size is out of
    /// range or the sizes are not ordered `min <= normal <= max`.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_blockmap::ChunkingParams;
    ///
    /// assert!(ChunkingParams::default().validate().is_ok());
    ///
    /// let tiny = ChunkingParams { min_size: 1, ..Default::default() };
    /// assert!(tiny.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        check_range("min_size", self.min_size, MINIMUM_MIN, MINIMUM_MAX)?;
        check_range("normal_size", self.normal_size, AVERAGE_MIN, AVERAGE_MAX)?;
        check_range("max_size", self.max_size, MAXIMUM_MIN, MAXIMUM_MAX)?;

        if self.min_size > self.normal_size || self.normal_size > self.max_size {
            return Err(BlockMapError::InvalidChunkingParams {
                reason: format!(
                    "sizes must satisfy min <= normal <= max, got {} / {} / {}",
                    self.min_size, self.normal_size, self.max_size
                ),
            });
        }

        Ok(())
    }
}

fn check_range(name: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(BlockMapError::InvalidChunkingParams {
            reason: format!("{name} {value} outside {min}..={max}"),
        })
    }
}

/// Ordered chunk decomposition of a file plus the parameters that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMap {
    /// Digest algorithm of the chunk checksums
    pub algorithm: HashAlgorithm,
    /// Minimum chunk size used when chunking
    pub min_size: u32,
    /// Maximum chunk size used when chunking
    pub max_size: u32,
    /// Normal (average) chunk size used when chunking
    pub normal_size: u32,
    /// Chunks in file order
    pub chunks: Vec<Chunk>,
}

impl BlockMap {
    /// Creates a block map with no chunks, describing an empty or unknown file.
    #[must_use]
    pub fn empty(params: ChunkingParams) -> Self {
        Self {
            algorithm: params.algorithm,
            min_size: params.min_size,
            max_size: params.max_size,
            normal_size: params.normal_size,
            chunks: Vec::new(),
        }
    }

    /// Chunks everything readable from `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockMapError::InvalidChunkingParams`] for unsupported sizes
    /// and [`BlockMapError::Io`] if reading fails.
    pub fn from_reader<R: Read>(reader: R, params: ChunkingParams) -> Result<Self> {
        params.validate()?;

        let mut map = Self::empty(params);
        let chunker = StreamCDC::new(reader, params.min_size, params.normal_size, params.max_size);
        for entry in chunker {
            let entry = entry.map_err(|e| match e {
                fastcdc::v2020::Error::IoError(io) => BlockMapError::Io(io),
                other => BlockMapError::Io(std::io::Error::other(other.to_string())),
            })?;
            let length = u32::try_from(entry.length).map_err(|_| {
                BlockMapError::InvalidChunkingParams {
                    reason: format!("chunk length {} exceeds u32", entry.length),
                }
            })?;
            map.chunks.push(Chunk::new(
                entry.offset,
                length,
                params.algorithm.digest(&entry.data),
            ));
        }

        tracing::debug!(
            chunks = map.chunks.len(),
            size = map.total_size(),
            algorithm = %params.algorithm,
            "built block map"
        );
        Ok(map)
    }

    /// Chunks the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockMapError::Io`] if the file cannot be opened or read.
    pub fn from_file(path: &Path, params: ChunkingParams) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), params)
    }

    /// Returns the parameters this map was built with.
    #[must_use]
    pub const fn params(&self) -> ChunkingParams {
        ChunkingParams {
            algorithm: self.algorithm,
            min_size: self.min_size,
            normal_size: self.normal_size,
            max_size: self.max_size,
        }
    }

    /// Total size of the described file in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.chunks.iter().map(|c| u64::from(c.length)).sum()
    }

    /// Returns the set of distinct chunk contents in this map.
    #[must_use]
    pub fn chunk_set(&self) -> HashSet<&Chunk> {
        self.chunks.iter().collect()
    }

    /// Checks that the chunks tile a file from offset 0 without gaps.
    ///
    /// Every chunk must be non-empty, no longer than `max_size`, carry a
    /// digest of the map's algorithm, and start where the previous one ends.
    /// Maps received from a server must pass this before they are diffed
    /// or merged.
    ///
    /// # Errors
    ///
    /// Returns [`BlockMapError::InvalidChunkingParams`] if the recorded
    /// parameters are unsupported and [`BlockMapError::InvalidBlockMap`]
    /// if a chunk fails a check.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_blockmap::{BlockMap, Chunk, ChunkingParams};
    ///
    /// let mut map = BlockMap::from_reader(&b"payload"[..], ChunkingParams::default()).unwrap();
    /// assert!(map.validate().is_ok());
    ///
    /// map.chunks.push(Chunk::new(u64::MAX, 10, vec![0; 32]));
    /// assert!(map.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        self.params().validate()?;

        let digest_len = self.algorithm.output_len();
        let mut expected_offset: u64 = 0;
        for (index, chunk) in self.chunks.iter().enumerate() {
            let invalid = |reason: String| BlockMapError::InvalidBlockMap {
                reason: format!("chunk {index}: {reason}"),
            };

            if chunk.offset != expected_offset {
                return Err(invalid(format!(
                    "starts at {}, expected {expected_offset}",
                    chunk.offset
                )));
            }
            if chunk.length == 0 || chunk.length > self.max_size {
                return Err(invalid(format!(
                    "length {} outside 1..={}",
                    chunk.length, self.max_size
                )));
            }
            if chunk.checksum.len() != digest_len {
                return Err(invalid(format!(
                    "digest has {} bytes, {} needs {digest_len}",
                    chunk.checksum.len(),
                    self.algorithm
                )));
            }
            expected_offset = chunk
                .offset
                .checked_add(u64::from(chunk.length))
                .ok_or_else(|| invalid("end offset overflows".to_string()))?;
        }

        Ok(())
    }

    /// Parses the sidecar archive body.
    ///
    /// The `blockmap.json` entry is preferred. An archive with exactly one
    /// entry under another name is accepted as well.
    ///
    /// # Errors
    ///
    /// Returns [`BlockMapError::Zip`] if the body is not a zip archive,
    /// [`BlockMapError::MissingArchiveEntry`] if no block map entry exists,
    /// and [`BlockMapError::Json`] if the entry does not parse.
    pub fn from_zip(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let index = match archive.index_for_name(BLOCKMAP_FILENAME) {
            Some(index) => index,
            None if archive.len() == 1 => 0,
            None => {
                return Err(BlockMapError::MissingArchiveEntry {
                    entry: BLOCKMAP_FILENAME.to_string(),
                });
            }
        };

        let entry = archive.by_index(index)?;
        Ok(serde_json::from_reader(entry)?)
    }

    /// Serializes the map into a sidecar archive body.
    ///
    /// # Errors
    ///
    /// Returns [`BlockMapError::Zip`] or [`BlockMapError::Json`] if writing
    /// the archive fails.
    pub fn to_zip(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        writer.start_file(BLOCKMAP_FILENAME, options)?;
        writer.write_all(&serde_json::to_vec(self)?)?;

        Ok(writer.finish()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state.to_le_bytes()[0]
            })
            .collect()
    }

    #[test]
    fn test_default_params_are_valid() {
        let params = ChunkingParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.min_size, 2048);
        assert_eq!(params.normal_size, 8192);
        assert_eq!(params.max_size, 65536);
    }

    #[test]
    fn test_params_out_of_bounds() {
        let too_small = ChunkingParams {
            max_size: 512,
            ..Default::default()
        };
        assert!(too_small.validate().is_err());

        let unordered = ChunkingParams {
            min_size: 16 * 1024,
            normal_size: 8 * 1024,
            ..Default::default()
        };
        let err = unordered.validate().unwrap_err();
        assert!(err.to_string().contains("min <= normal <= max"));
    }

    #[test]
    fn test_from_reader_rejects_bad_params_before_reading() {
        let params = ChunkingParams {
            normal_size: 10,
            ..Default::default()
        };
        let err = BlockMap::from_reader(&[0u8; 10][..], params).unwrap_err();
        assert!(matches!(err, BlockMapError::InvalidChunkingParams { .. }));
    }

    #[test]
    fn test_chunks_cover_input_contiguously() {
        let data = pseudo_random(300_000, 7);
        let map = BlockMap::from_reader(&data[..], ChunkingParams::default()).unwrap();

        assert!(map.chunks.len() > 1);
        let mut expected_offset = 0;
        for chunk in &map.chunks {
            assert_eq!(chunk.offset, expected_offset);
            assert!(chunk.length <= map.max_size);
            let start = usize::try_from(chunk.offset).unwrap();
            let end = usize::try_from(chunk.end()).unwrap();
            assert_eq!(chunk.checksum, HashAlgorithm::Sha256.digest(&data[start..end]));
            expected_offset = chunk.end();
        }
        assert_eq!(map.total_size(), 300_000);
    }

    #[test]
    fn test_empty_input_has_no_chunks() {
        let map = BlockMap::from_reader(&[][..], ChunkingParams::default()).unwrap();
        assert!(map.chunks.is_empty());
        assert_eq!(map.total_size(), 0);
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let data = pseudo_random(200_000, 99);
        let a = BlockMap::from_reader(&data[..], ChunkingParams::default()).unwrap();
        let b = BlockMap::from_reader(&data[..], ChunkingParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_local_edit_keeps_most_chunks() {
        let old = pseudo_random(400_000, 3);
        let mut new = old.clone();
        for byte in &mut new[200_000..200_100] {
            *byte = byte.wrapping_add(1);
        }

        let old_map = BlockMap::from_reader(&old[..], ChunkingParams::default()).unwrap();
        let new_map = BlockMap::from_reader(&new[..], ChunkingParams::default()).unwrap();
        let old_set = old_map.chunk_set();
        let shared = new_map.chunks.iter().filter(|c| old_set.contains(c)).count();

        assert!(shared + 4 >= new_map.chunks.len());
    }

    #[test]
    fn test_json_field_names() {
        let map = BlockMap::from_reader(&b"hello"[..], ChunkingParams::default()).unwrap();
        let json = serde_json::to_value(&map).unwrap();

        assert_eq!(json["algorithm"], "SHA-256");
        assert_eq!(json["minSize"], 2048);
        assert_eq!(json["maxSize"], 65536);
        assert_eq!(json["normalSize"], 8192);
        assert_eq!(json["chunks"][0]["length"], 5);
    }

    #[test]
    fn test_validate_accepts_built_maps() {
        let data = pseudo_random(300_000, 17);
        let map = BlockMap::from_reader(&data[..], ChunkingParams::default()).unwrap();
        assert!(map.validate().is_ok());
        assert!(BlockMap::empty(ChunkingParams::default()).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_broken_maps() {
        let data = pseudo_random(100_000, 19);
        let map = BlockMap::from_reader(&data[..], ChunkingParams::default()).unwrap();
        let end = map.total_size();

        let mut overflow = map.clone();
        overflow.chunks.push(Chunk::new(u64::MAX, 10, vec![0xab; 32]));
        assert!(matches!(
            overflow.validate(),
            Err(BlockMapError::InvalidBlockMap { .. })
        ));

        let mut gap = map.clone();
        gap.chunks.push(Chunk::new(end + 1, 10, vec![0xab; 32]));
        assert!(gap.validate().unwrap_err().to_string().contains("expected"));

        let mut oversized = map.clone();
        oversized.chunks.push(Chunk::new(end, u32::MAX, vec![0xab; 32]));
        assert!(oversized.validate().is_err());

        let mut empty_chunk = map.clone();
        empty_chunk.chunks.push(Chunk::new(end, 0, vec![0xab; 32]));
        assert!(empty_chunk.validate().is_err());

        let mut short_digest = map.clone();
        short_digest.chunks.push(Chunk::new(end, 10, vec![0xab; 4]));
        assert!(short_digest.validate().is_err());

        let bad_params = BlockMap {
            max_size: 1,
            ..map
        };
        assert!(matches!(
            bad_params.validate(),
            Err(BlockMapError::InvalidChunkingParams { .. })
        ));
    }

    #[test]
    fn test_zip_round_trip() {
        let data = pseudo_random(50_000, 11);
        let map = BlockMap::from_reader(&data[..], ChunkingParams::default()).unwrap();
        let restored = BlockMap::from_zip(&map.to_zip().unwrap()).unwrap();
        assert_eq!(restored, map);
    }

    #[test]
    fn test_zip_with_single_differently_named_entry() {
        let map = BlockMap::from_reader(&b"payload"[..], ChunkingParams::default()).unwrap();

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("plugin.blockmap.json", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&serde_json::to_vec(&map).unwrap()).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert_eq!(BlockMap::from_zip(&bytes).unwrap(), map);
    }

    #[test]
    fn test_zip_missing_entry() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("a.txt", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"a").unwrap();
        writer.start_file("b.txt", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"b").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = BlockMap::from_zip(&bytes).unwrap_err();
        assert!(matches!(err, BlockMapError::MissingArchiveEntry { .. }));
    }

    #[test]
    fn test_zip_garbage() {
        assert!(matches!(
            BlockMap::from_zip(b"not a zip"),
            Err(BlockMapError::Zip(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin.zip");
        let data = pseudo_random(20_000, 5);
        std::fs::write(&path, &data).unwrap();

        let from_file = BlockMap::from_file(&path, ChunkingParams::default()).unwrap();
        let from_memory = BlockMap::from_reader(&data[..], ChunkingParams::default()).unwrap();
        assert_eq!(from_file, from_memory);
    }
}
