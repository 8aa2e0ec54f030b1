//! Artifact URLs, sidecar locations, and target file naming.

use crate::error::{ClientError, Result};
use marketplace_blockmap::{BLOCKMAP_ZIP_SUFFIX, HASH_FILENAME_SUFFIX};
use reqwest::Url;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};
use std::path::{Path, PathBuf};

const FILENAME_MARKER: &str = "filename=";

/// Where an artifact lives, and where its sidecars live next to it.
///
/// # Examples
///
/// ```
/// use marketplace_client::{ArtifactLocation, Url};
///
/// let url = Url::parse("https://cdn.example.com/files/42/plugin-1.2.zip?token=x").unwrap();
/// let location = ArtifactLocation::from_url(&url).unwrap();
/// assert_eq!(location.file_name(), "plugin-1.2.zip");
/// assert_eq!(
///     location.block_map_url().as_str(),
///     "https://cdn.example.com/files/42/plugin-1.2.zip.blockmap.zip"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    url: Url,
    file_name: String,
}

impl ArtifactLocation {
    /// Derives the location from the final URL of a download.
    ///
    /// The query string and fragment are dropped; the file name is the last
    /// path segment.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the URL has no file name.
    pub fn from_url(url: &Url) -> Result<Self> {
        let mut url = url.clone();
        url.set_query(None);
        url.set_fragment(None);

        let file_name = url
            .path()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if file_name.is_empty() || url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl {
                url: url.to_string(),
                reason: "no file name in path".to_string(),
            });
        }
        Ok(Self { url, file_name })
    }

    /// Last path segment of the artifact URL, as it appears in the URL.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Artifact URL without query or fragment.
    #[must_use]
    pub const fn artifact_url(&self) -> &Url {
        &self.url
    }

    /// URL of the `.blockmap.zip` sidecar.
    #[must_use]
    pub fn block_map_url(&self) -> Url {
        self.sibling(BLOCKMAP_ZIP_SUFFIX)
    }

    /// URL of the `.hash.json` sidecar.
    #[must_use]
    pub fn hash_url(&self) -> Url {
        self.sibling(HASH_FILENAME_SUFFIX)
    }

    fn sibling(&self, suffix: &str) -> Url {
        let mut url = self.url.clone();
        let path = format!("{}{suffix}", self.url.path());
        url.set_path(&path);
        url
    }
}

/// Picks a file name for a downloaded artifact.
///
/// Uses `Content-Disposition: ...; filename=<name>` when present, otherwise
/// the last segment of `url`.
#[must_use]
pub fn suggested_file_name(headers: &HeaderMap, url: &Url) -> String {
    let disposition = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(FILENAME_MARKER).map(|(_, rest)| rest));

    if let Some(rest) = disposition {
        let name = rest.split(';').next().unwrap_or_default().trim();
        return name
            .strip_prefix('"')
            .and_then(|n| n.strip_suffix('"'))
            .unwrap_or(name)
            .to_string();
    }

    url.path().rsplit('/').next().unwrap_or_default().to_string()
}

/// Resolves the output path of a download.
///
/// When `target` is an existing directory the file goes inside it under
/// `suggested`; otherwise `target` is the file path itself.
///
/// # Errors
///
/// Returns [`ClientError::InvalidFileName`] if the name is empty, a
/// relative directory reference, or contains a path separator.
pub async fn resolve_target(target: &Path, suggested: &str) -> Result<PathBuf> {
    let is_dir = tokio::fs::metadata(target)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Ok(target.to_path_buf());
    }

    let invalid = suggested.is_empty()
        || suggested == "."
        || suggested == ".."
        || suggested.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ClientError::InvalidFileName {
            name: suggested.to_string(),
        });
    }
    Ok(target.join(suggested))
}
