//! Plugin repository facade.

use crate::artifact::{ArtifactLocation, resolve_target, suggested_file_name};
use crate::delta::{DeltaDownloader, ensure_old_file};
use crate::download::{Download, require_success, save_archive};
use crate::error::{ClientError, Result};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use marketplace_core::{Channel, ClientConfig, PluginXmlId, UpdateId};
use reqwest::Url;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which artifact to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadRequest {
    /// A specific version of a plugin
    Version {
        /// Plugin id from `plugin.xml`
        plugin: PluginXmlId,
        /// Version string as published
        version: String,
        /// Release channel
        channel: Channel,
    },
    /// A specific uploaded update
    Update(UpdateId),
    /// The newest version compatible with an IDE build
    LatestCompatible {
        /// Plugin id from `plugin.xml`
        plugin: PluginXmlId,
        /// IDE build number such as `IU-243.21565.193`
        ide_build: String,
        /// Release channel
        channel: Channel,
    },
}

impl DownloadRequest {
    /// Builds the download endpoint URL on `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if `host` cannot carry a path.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_client::{DownloadRequest, Url};
    /// use marketplace_core::{Channel, PluginXmlId};
    ///
    /// let host = Url::parse("https://plugins.jetbrains.com").unwrap();
    /// let request = DownloadRequest::Version {
    ///     plugin: PluginXmlId::new("org.rust.lang").unwrap(),
    ///     version: "0.4.200".to_string(),
    ///     channel: Channel::Default,
    /// };
    /// assert_eq!(
    ///     request.endpoint(&host).unwrap().as_str(),
    ///     "https://plugins.jetbrains.com/plugin/download?pluginId=org.rust.lang&version=0.4.200"
    /// );
    /// ```
    pub fn endpoint(&self, host: &Url) -> Result<Url> {
        let mut base = host.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let path = match self {
            Self::Version { .. } | Self::Update(_) => "plugin/download",
            Self::LatestCompatible { .. } => "pluginManager",
        };
        let mut url = base.join(path).map_err(|e| ClientError::InvalidUrl {
            url: base.to_string(),
            reason: e.to_string(),
        })?;

        {
            let mut query = url.query_pairs_mut();
            match self {
                Self::Version {
                    plugin,
                    version,
                    channel,
                } => {
                    query
                        .append_pair("pluginId", plugin.as_str())
                        .append_pair("version", version);
                    if let Some(name) = channel.as_query() {
                        query.append_pair("channel", name);
                    }
                }
                Self::Update(id) => {
                    query.append_pair("updateId", &id.to_string());
                }
                Self::LatestCompatible {
                    plugin,
                    ide_build,
                    channel,
                } => {
                    query
                        .append_pair("action", "download")
                        .append_pair("id", plugin.as_str())
                        .append_pair("build", ide_build);
                    if let Some(name) = channel.as_query() {
                        query.append_pair("channel", name);
                    }
                }
            }
        }
        Ok(url)
    }
}

impl fmt::Display for DownloadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version {
                plugin,
                version,
                channel,
            } => write!(f, "{plugin}:{version} ({channel})"),
            Self::Update(id) => write!(f, "update #{id}"),
            Self::LatestCompatible {
                plugin,
                ide_build,
                channel,
            } => write!(f, "{plugin} for build {ide_build} ({channel})"),
        }
    }
}

/// Client for the plugin repository's download endpoints.
///
/// # Examples
///
/// ```no_run
/// use marketplace_client::{DownloadRequest, PluginRepository};
/// use marketplace_core::{ClientConfig, UpdateId};
/// use std::path::Path;
///
/// # async fn example() -> marketplace_client::Result<()> {
/// let repository = PluginRepository::new(&ClientConfig::default())?;
/// let request = DownloadRequest::Update(UpdateId::new(412_345));
///
/// let downloaded = repository
///     .download_via_block_map(&request, Path::new("plugins"), Path::new("plugins/old.zip"))
///     .await?;
/// if let Some(download) = downloaded {
///     println!("saved {}", download.path.display());
/// }
/// # Ok(())
/// # }
/// ```
pub struct PluginRepository {
    transport: Arc<dyn Transport>,
    host: Url,
    max_download_fraction: f64,
    cancel: CancellationToken,
}

impl fmt::Debug for PluginRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRepository")
            .field("host", &self.host.as_str())
            .field("max_download_fraction", &self.max_download_fraction)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl PluginRepository {
    /// Creates a repository client over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for invalid configuration,
    /// [`ClientError::InvalidUrl`] for an unparsable host, and
    /// [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a repository client over a custom transport.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for invalid configuration and
    /// [`ClientError::InvalidUrl`] for an unparsable host.
    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let host = Url::parse(&config.host).map_err(|e| ClientError::InvalidUrl {
            url: config.host.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            transport,
            host,
            max_download_fraction: config.max_download_fraction,
            cancel: CancellationToken::new(),
        })
    }

    /// Uses `token` for interruption instead of a private one.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that interrupts running and future downloads when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Downloads the whole artifact into `target`.
    ///
    /// `target` is a file path or an existing directory. Returns `None` if
    /// the artifact does not exist or is not an archive.
    ///
    /// # Errors
    ///
    /// - [`ClientError::DownloadFailed`] for non-404 error statuses
    /// - [`ClientError::Interrupted`] if cancelled
    /// - transport and filesystem errors
    pub async fn download(&self, request: &DownloadRequest, target: &Path) -> Result<Option<Download>> {
        self.cancellable(async {
            tracing::info!(%request, "downloading");
            match self.open(request).await? {
                Some(response) => save_archive(response, target).await,
                None => Ok(None),
            }
        })
        .await
    }

    /// Downloads the artifact into `target`, reusing content of `old_file`.
    ///
    /// Fetches the block map and hash published next to the artifact and
    /// requests only the chunks `old_file` lacks. Every failure of the delta
    /// path falls back to a full download, so the outcome is the same as
    /// [`download`](Self::download) apart from
    /// [`Download::method`](crate::Download::method).
    ///
    /// # Errors
    ///
    /// Same as [`download`](Self::download).
    pub async fn download_via_block_map(
        &self,
        request: &DownloadRequest,
        target: &Path,
        old_file: &Path,
    ) -> Result<Option<Download>> {
        self.cancellable(async {
            tracing::info!(%request, old_file = %old_file.display(), "downloading via block map");
            let Some(response) = self.open(request).await? else {
                return Ok(None);
            };

            if let Err(e) = ensure_old_file(old_file).await {
                tracing::info!(error = %e, "skipping block map");
                return save_archive(response, target).await;
            }

            let location = match ArtifactLocation::from_url(&response.url) {
                Ok(location) => location,
                Err(e) => {
                    tracing::info!(error = %e, "skipping block map");
                    return save_archive(response, target).await;
                }
            };
            let name = suggested_file_name(&response.headers, &response.url);
            let path = resolve_target(target, &name).await?;
            drop(response);

            let delta = DeltaDownloader::new(Arc::clone(&self.transport), self.max_download_fraction);
            match delta.download(&location, old_file, &path).await {
                Ok(download) => Ok(Some(download)),
                Err(e) if e.is_fallback() => {
                    tracing::warn!(
                        url = %location.artifact_url(),
                        error = %e,
                        "block map download failed, falling back to full download"
                    );
                    let response = self
                        .transport
                        .get(HttpRequest::get(location.artifact_url().clone()))
                        .await?;
                    match require_success(response).await? {
                        Some(response) => save_archive(response, &path).await,
                        None => Ok(None),
                    }
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn open(&self, request: &DownloadRequest) -> Result<Option<HttpResponse>> {
        let url = request.endpoint(&self.host)?;
        let response = self.transport.get(HttpRequest::get(url)).await?;
        require_success(response).await
    }

    async fn cancellable<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
        T: Send,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::info!("download interrupted");
                Err(ClientError::Interrupted)
            }
            result = work => result,
        }
    }
}
