//! Full (non-incremental) artifact download.

use crate::artifact::{resolve_target, suggested_file_name};
use crate::error::{ClientError, Result};
use crate::partial::PartialFile;
use crate::transport::HttpResponse;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Content types accepted as a plugin archive.
pub const ARCHIVE_CONTENT_TYPES: [&str; 2] = ["application/zip", "application/java-archive"];

const NOT_FOUND: u16 = 404;

/// A finished download.
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    /// Where the archive was written
    pub path: PathBuf,
    /// Size of the archive in bytes
    pub size: u64,
    /// How the bytes were obtained
    pub method: DownloadMethod,
}

/// How a download obtained its bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownloadMethod {
    /// The whole archive was transferred
    Full,
    /// The archive was rebuilt from an old copy plus fetched ranges
    Delta {
        /// Bytes copied from the old file
        reused: u64,
        /// Bytes fetched over range requests
        fetched: u64,
        /// Number of range requests issued
        range_requests: usize,
        /// Share of the new file that had to be fetched
        download_fraction: f64,
    },
}

impl DownloadMethod {
    /// Returns `true` for block-map downloads that did not fall back.
    #[must_use]
    pub const fn is_delta(&self) -> bool {
        matches!(self, Self::Delta { .. })
    }
}

/// Returns `true` if the media type of `content_type` is an archive type.
///
/// Parameters such as `charset` are ignored.
///
/// # Examples
///
/// ```
/// use marketplace_client::download::is_archive_content_type;
///
/// assert!(is_archive_content_type(Some("application/java-archive")));
/// assert!(is_archive_content_type(Some("Application/Zip; charset=binary")));
/// assert!(!is_archive_content_type(Some("text/html")));
/// assert!(!is_archive_content_type(None));
/// ```
#[must_use]
pub fn is_archive_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|v| v.split(';').next())
        .map(str::trim)
        .is_some_and(|essence| {
            ARCHIVE_CONTENT_TYPES
                .iter()
                .any(|accepted| essence.eq_ignore_ascii_case(accepted))
        })
}

/// Classifies a download endpoint response.
///
/// `404` means the requested plugin version does not exist and yields
/// `None`; any other non-2xx status is an error.
///
/// # Errors
///
/// Returns [`ClientError::DownloadFailed`] with the server's message.
pub async fn require_success(response: HttpResponse) -> Result<Option<HttpResponse>> {
    if response.is_success() {
        return Ok(Some(response));
    }
    if response.status == NOT_FOUND {
        tracing::info!(url = %response.url, "artifact not found");
        return Ok(None);
    }
    let status = response.status;
    Err(ClientError::DownloadFailed {
        status,
        message: response.error_message().await,
    })
}

/// Streams an archive response into `target`.
///
/// `target` may be a file path or an existing directory; see
/// [`resolve_target`]. The body goes to a `.part` file first and is renamed
/// into place once complete. Returns `None` without touching the disk when
/// the response is not an archive.
///
/// # Errors
///
/// Returns [`ClientError::InvalidFileName`] for unusable suggested names and
/// [`ClientError::Io`] for read or write failures.
pub async fn save_archive(response: HttpResponse, target: &Path) -> Result<Option<Download>> {
    if !is_archive_content_type(response.content_type()) {
        tracing::info!(
            url = %response.url,
            content_type = response.content_type().unwrap_or("<none>"),
            "response is not a plugin archive"
        );
        return Ok(None);
    }

    let name = suggested_file_name(&response.headers, &response.url);
    let path = resolve_target(target, &name).await?;

    let (partial, mut file) = PartialFile::create(&path).await?;
    let mut body = response.body;
    let written = tokio::io::copy_buf(&mut body, &mut file).await?;
    file.flush().await?;
    drop(file);

    let path = partial.commit().await?;
    tracing::info!(path = %path.display(), bytes = written, "downloaded full archive");
    Ok(Some(Download {
        path,
        size: written,
        method: DownloadMethod::Full,
    }))
}
