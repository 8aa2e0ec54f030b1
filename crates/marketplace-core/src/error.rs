//! Error types shared across the Marketplace client.
//!
//! # Examples
//!
//! ```
//! use marketplace_core::{Error, Result};
//!
//! fn require_host(host: &str) -> Result<()> {
//!     if host.is_empty() {
//!         return Err(Error::ConfigError {
//!             message: "host cannot be empty".to_string(),
//!         });
//!     }
//!     Ok(())
//! }
//!
//! let err = require_host("").unwrap_err();
//! assert!(err.is_config_error());
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for core operations.
///
/// Covers configuration loading, argument parsing, and validation of
/// domain types. Transport and delta-transfer failures have their own
/// error types in the crates that produce them.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    ///
    /// Raised when configuration is invalid, missing required fields,
    /// or contains contradictory settings.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration problem
        message: String,
    },

    /// Configuration file could not be read.
    #[error("Failed to read configuration file {path}")]
    ConfigRead {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for [`crate::ClientConfig`].
    #[error("Failed to parse configuration file {path}")]
    ConfigParse {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying TOML error
        #[source]
        source: toml::de::Error,
    },

    /// Invalid argument error.
    ///
    /// Raised when CLI arguments or function parameters are invalid.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Validation error for domain types.
    ///
    /// Raised when creating domain types like `PluginXmlId` from input that
    /// does not meet their format requirements.
    #[error("Validation error in {field}: {reason}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Detailed reason for the validation failure
        reason: String,
    },
}

impl Error {
    /// Returns `true` if this is a configuration error.
    ///
    /// Read and parse failures of the configuration file count as
    /// configuration errors.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_core::Error;
    ///
    /// let err = Error::ConfigError {
    ///     message: "Invalid timeout".to_string(),
    /// };
    /// assert!(err.is_config_error());
    /// ```
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigError { .. } | Self::ConfigRead { .. } | Self::ConfigParse { .. }
        )
    }

    /// Returns `true` if this is a validation error.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_core::Error;
    ///
    /// let err = Error::ValidationError {
    ///     field: "plugin_id".to_string(),
    ///     reason: "cannot be empty".to_string(),
    /// };
    /// assert!(err.is_validation_error());
    /// ```
    #[must_use]
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::ValidationError { .. })
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
