//! Block-map based delta transfer for plugin archives.
//!
//! Given an old local copy of an archive and the published block map of the
//! new one, this crate works out which chunks are missing, fetches only
//! those over multi-range HTTP requests, and splices the new file together
//! from old bytes and fetched bytes.
//!
//! # Architecture
//!
//! ```text
//! BlockMap (old) ─┐
//!                 ├─ diff ─► RangeBatcher ─► RangeFetcher ─► multipart parser
//! BlockMap (new) ─┘                                               │
//!                                                                 ▼
//! old file ───────────────────────── merge ◄──────────── ChunkDataSource
//!                                      │
//!                                      ▼
//!                                   new file
//! ```
//!
//! - [`BlockMap`] and [`Chunk`]: content-defined chunking (FastCDC) with
//!   per-chunk digests; chunks compare by content, not position
//! - [`diff`]: chunks of the new map whose content the old map lacks
//! - [`RangeBatcher`]: packs missing chunks into `Range` headers bounded by
//!   header length and payload size, coalescing adjacent chunks
//! - [`multipart`]: parses `multipart/byteranges` responses
//! - [`ChunkDataSource`]: lazily issues range batches as chunks are consumed
//! - [`merge()`]: writes the new file sequentially
//!
//! # Sidecars
//!
//! Repositories publish `<artifact>.blockmap.zip` (one `blockmap.json`
//! entry) and `<artifact>.hash.json` next to each artifact. [`BlockMap::to_zip`]
//! and [`FileHash::to_json`] produce the same format, so any mirror can
//! serve delta updates.

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod base64_serde;

pub mod batch;
pub mod blockmap;
pub mod chunk;
pub mod diff;
pub mod error;
pub mod hash;
pub mod merge;
pub mod multipart;
pub mod source;

pub use batch::{MAX_HTTP_HEADERS_LENGTH, MAX_RANGE_BYTES, RangeBatch, RangeBatcher, RangePart};
pub use blockmap::{
    BLOCKMAP_FILENAME, BLOCKMAP_ZIP_SUFFIX, BlockMap, ChunkingParams, HASH_FILENAME_SUFFIX,
};
pub use chunk::Chunk;
pub use diff::{diff, download_fraction};
pub use error::{BlockMapError, Result};
pub use hash::{FileHash, HashAlgorithm};
pub use merge::{MergeStats, merge};
pub use source::{ChunkDataSource, ChunkSource, RangeFetcher, RangeResponse, fetch_error};
