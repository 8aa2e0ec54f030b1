//! Strong domain types for Marketplace requests.
//!
//! Newtypes keep plugin identifiers, update ids, and release channels from
//! being mixed up with each other or with arbitrary strings.
//!
//! # Examples
//!
//! ```
//! use marketplace_core::{Channel, PluginXmlId, UpdateId};
//!
//! let id = PluginXmlId::new("org.jetbrains.kotlin").unwrap();
//! let update = UpdateId::new(1024);
//! let channel = Channel::parse("eap");
//! assert_eq!(channel.as_query(), Some("eap"));
//! assert_eq!(id.as_str(), "org.jetbrains.kotlin");
//! assert_eq!(update.get(), 1024);
//! ```

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Plugin identifier declared in `plugin.xml` (e.g. `org.jetbrains.kotlin`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginXmlId(String);

impl PluginXmlId {
    /// Maximum accepted identifier length.
    pub const MAX_LEN: usize = 256;

    /// Creates a validated plugin identifier.
    ///
    /// Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if the identifier is empty, longer
    /// than [`Self::MAX_LEN`], or contains control characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_core::PluginXmlId;
    ///
    /// assert!(PluginXmlId::new("  com.example.plugin ").is_ok());
    /// assert!(PluginXmlId::new("").is_err());
    /// assert!(PluginXmlId::new("id\r\nHost: evil").is_err());
    /// ```
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.chars().any(char::is_control) {
            return Err(Error::ValidationError {
                field: "plugin_id".to_string(),
                reason: "cannot contain control characters".to_string(),
            });
        }

        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(Error::ValidationError {
                field: "plugin_id".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }

        if trimmed.len() > Self::MAX_LEN {
            return Err(Error::ValidationError {
                field: "plugin_id".to_string(),
                reason: format!("too long (max {} characters)", Self::MAX_LEN),
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginXmlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PluginXmlId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Numeric identifier of a single uploaded plugin update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpdateId(u32);

impl UpdateId {
    /// Wraps a raw update id.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw update id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for UpdateId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Release channel of a plugin.
///
/// The repository treats an absent channel as the stable one. Empty input
/// and the `_default_` placeholder both map to [`Channel::Default`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    /// The default (stable) channel
    #[default]
    Default,
    /// A named channel such as `eap` or `nightly`
    Named(String),
}

impl Channel {
    /// Placeholder accepted on the command line for the default channel.
    pub const DEFAULT_PLACEHOLDER: &'static str = "_default_";

    /// Parses user input into a channel.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_core::Channel;
    ///
    /// assert_eq!(Channel::parse(""), Channel::Default);
    /// assert_eq!(Channel::parse("_default_"), Channel::Default);
    /// assert_eq!(Channel::parse("eap"), Channel::Named("eap".to_string()));
    /// ```
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == Self::DEFAULT_PLACEHOLDER {
            Self::Default
        } else {
            Self::Named(trimmed.to_string())
        }
    }

    /// Returns the value to send as the `channel` query parameter, if any.
    #[must_use]
    pub fn as_query(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("stable"),
            Self::Named(name) => f.write_str(name),
        }
    }
}
