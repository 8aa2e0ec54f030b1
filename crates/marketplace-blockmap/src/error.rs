//! Error types for block map and delta reconstruction operations.

/// Result type for block map operations.
pub type Result<T> = std::result::Result<T, BlockMapError>;

/// Errors that can occur while building block maps or reconstructing files.
#[derive(thiserror::Error, Debug)]
pub enum BlockMapError {
    /// A multipart/byteranges response did not have the expected framing.
    ///
    /// Carries the line or header that was expected and what the stream
    /// actually contained, so server-side incompatibilities can be diagnosed
    /// from logs.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_blockmap::BlockMapError;
    ///
    /// let err = BlockMapError::MalformedMultipart {
    ///     expected: "boundary line containing 'XYZ'".to_string(),
    ///     found: "--ABC".to_string(),
    /// };
    /// assert!(err.is_malformed_response());
    /// ```
    #[error("Malformed multipart response: expected {expected}, found '{found}'")]
    MalformedMultipart {
        /// What the parser was looking for
        expected: String,
        /// What the parser read instead
        found: String,
    },

    /// A single line of a multipart response exceeded the line limit.
    #[error("Multipart line exceeds {limit} bytes")]
    LineTooLong {
        /// The maximum accepted line length
        limit: usize,
    },

    /// The range response carried no `Content-Type` header.
    #[error("Range response has no Content-Type header")]
    MissingContentType,

    /// The range response had a status other than `206 Partial Content`.
    #[error("Unexpected HTTP status {status} for range request")]
    UnexpectedStatus {
        /// HTTP status code received
        status: u16,
    },

    /// A chunk pulled from the data source had the wrong length.
    #[error("Chunk at offset {offset} has length {actual}, expected {expected}")]
    ChunkLengthMismatch {
        /// Offset of the chunk in the new file
        offset: u64,
        /// Length declared by the block map
        expected: u32,
        /// Length of the received buffer
        actual: usize,
    },

    /// The data source still had chunks after the merge finished.
    #[error("Chunk data source not drained after merge")]
    SourceNotDrained,

    /// The data source ran out of chunks before the merge finished.
    #[error("Chunk data source exhausted at offset {offset}")]
    SourceExhausted {
        /// Offset of the chunk that could not be supplied
        offset: u64,
    },

    /// Chunking parameters are outside the range supported by the chunker.
    #[error("Invalid chunking parameters: {reason}")]
    InvalidChunkingParams {
        /// Why the parameters were rejected
        reason: String,
    },

    /// A block map does not describe a contiguous chunking of a file.
    #[error("Invalid block map: {reason}")]
    InvalidBlockMap {
        /// Which check failed
        reason: String,
    },

    /// Hash algorithm name is not supported.
    #[error("Unknown hash algorithm: {name}")]
    UnknownAlgorithm {
        /// The algorithm name as found in the input
        name: String,
    },

    /// The block map archive has no block map entry.
    #[error("Block map archive has no '{entry}' entry")]
    MissingArchiveEntry {
        /// Name of the expected entry
        entry: String,
    },

    /// Fetching a range batch failed at the transport level.
    #[error("Range fetch failed: {0}")]
    Fetch(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// I/O error while reading the old file or writing the new one.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zip archive error.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl BlockMapError {
    /// Returns `true` if the server's range response could not be parsed.
    #[must_use]
    pub const fn is_malformed_response(&self) -> bool {
        matches!(
            self,
            Self::MalformedMultipart { .. }
                | Self::LineTooLong { .. }
                | Self::MissingContentType
                | Self::UnexpectedStatus { .. }
        )
    }

    /// Returns `true` if local state disagrees with the block maps.
    ///
    /// These indicate a bug or a corrupted old file rather than a server
    /// problem.
    #[must_use]
    pub const fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            Self::ChunkLengthMismatch { .. }
                | Self::SourceNotDrained
                | Self::SourceExhausted { .. }
        )
    }
}
