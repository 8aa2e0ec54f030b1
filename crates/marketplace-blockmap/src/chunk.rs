//! Content-addressed chunk descriptor.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A byte range of a file identified by the digest of its content.
///
/// Equality and hashing consider only `(checksum, length)`. Two chunks at
/// different offsets with the same content are the same chunk for diffing.
///
/// # Examples
///
/// ```
/// use marketplace_blockmap::Chunk;
///
/// let a = Chunk::new(0, 4, vec![1, 2, 3]);
/// let b = Chunk::new(4096, 4, vec![1, 2, 3]);
/// assert_eq!(a, b);
/// assert_eq!(a.end(), 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of the first byte in the file
    pub offset: u64,
    /// Number of bytes in the chunk
    pub length: u32,
    /// Digest of the chunk content
    #[serde(rename = "hash", alias = "checksum", with = "crate::base64_serde")]
    pub checksum: Vec<u8>,
}

impl Chunk {
    /// Creates a chunk descriptor.
    #[must_use]
    pub const fn new(offset: u64, length: u32, checksum: Vec<u8>) -> Self {
        Self {
            offset,
            length,
            checksum,
        }
    }

    /// Offset one past the last byte of the chunk.
    ///
    /// Saturates at `u64::MAX`; [`BlockMap::validate`](crate::BlockMap::validate)
    /// rejects maps where that would happen.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset.saturating_add(self.length as u64)
    }

    /// Returns `true` if `next` starts exactly where this chunk ends.
    #[inline]
    #[must_use]
    pub const fn is_followed_by(&self, next: &Self) -> bool {
        self.end() == next.offset
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.checksum == other.checksum
    }
}

impl Eq for Chunk {}

impl Hash for Chunk {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.checksum.hash(state);
        self.length.hash(state);
    }
}
