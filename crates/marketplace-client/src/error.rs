//! Error types for repository downloads.

use marketplace_blockmap::BlockMapError;
use std::path::PathBuf;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while downloading plugins.
///
/// Delta-specific kinds (`MetadataUnavailable`, `UnfavorableSavings`,
/// `HashMismatch`, `OldFileMissing`, and block map errors) never reach the
/// caller of a block-map download; they are logged and replaced by a full
/// download. [`ClientError::Interrupted`] always propagates.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// A block map or hash sidecar could not be fetched or parsed.
    #[error("Delta metadata unavailable at {url}: {reason}")]
    MetadataUnavailable {
        /// Sidecar URL
        url: String,
        /// What went wrong
        reason: String,
    },

    /// The delta would fetch too large a share of the new file.
    #[error("Delta would download {:.1}% of the file (limit {:.1}%)", fraction * 100.0, threshold * 100.0)]
    UnfavorableSavings {
        /// Share of new-file bytes that would be fetched
        fraction: f64,
        /// Configured maximum share
        threshold: f64,
    },

    /// The reconstructed file does not match the published hash.
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Published hash
        expected: String,
        /// Hash of the reconstructed file
        actual: String,
    },

    /// The old file named for a block-map download does not exist.
    #[error("Old file not found: {}", path.display())]
    OldFileMissing {
        /// Path that was checked
        path: PathBuf,
    },

    /// The download was cancelled.
    #[error("Download interrupted")]
    Interrupted,

    /// The repository answered with a failure status.
    #[error("Download failed with HTTP status {status}{message}")]
    DownloadFailed {
        /// HTTP status code
        status: u16,
        /// Server-provided message, prefixed with `": "` when present
        message: String,
    },

    /// The file name suggested by the server cannot be used as a target.
    #[error("Invalid file name: '{name}'")]
    InvalidFileName {
        /// Rejected name
        name: String,
    },

    /// A URL could not be built or parsed.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// Offending URL or fragment
        url: String,
        /// Parser message
        reason: String,
    },

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Block map processing failure.
    #[error(transparent)]
    BlockMap(#[from] BlockMapError),

    /// Invalid client configuration.
    #[error(transparent)]
    Config(#[from] marketplace_core::Error),

    /// A blocking task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns `true` if the download was cancelled.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Returns `true` if a failed delta attempt should fall back to a full
    /// download.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_client::ClientError;
    ///
    /// let err = ClientError::UnfavorableSavings { fraction: 0.9, threshold: 0.65 };
    /// assert!(err.is_fallback());
    /// assert!(!ClientError::Interrupted.is_fallback());
    /// ```
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        !self.is_interrupted()
    }

    /// Returns `true` for transport failures and HTTP error statuses.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        match self {
            Self::Http(_) | Self::DownloadFailed { .. } | Self::MetadataUnavailable { .. } => true,
            Self::BlockMap(e) => matches!(e, BlockMapError::Fetch(_)),
            _ => false,
        }
    }
}
