//! `download` command.
//!
//! Downloads a plugin archive by xml id and version, by update id, or as
//! the newest build compatible with an IDE. With `--old-file` the block-map
//! delta path is tried first.

use crate::formatters::format_output;
use anyhow::{Result, bail};
use marketplace_client::{
    CancellationToken, Download, DownloadMethod, DownloadRequest, PluginRepository,
};
use marketplace_core::cli::{ExitCode, OutputFormat};
use marketplace_core::{Channel, ClientConfig, PluginXmlId, UpdateId};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Arguments of the `download` command as parsed from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadArgs {
    /// Plugin id from `plugin.xml`
    pub plugin: Option<String>,
    /// Exact version to download
    pub version: Option<String>,
    /// IDE build to find the newest compatible version for
    pub ide_build: Option<String>,
    /// Release channel; empty or `_default_` means the default channel
    pub channel: Option<String>,
    /// Update id, used instead of plugin and version
    pub update_id: Option<u32>,
    /// Target file or directory
    pub to: PathBuf,
    /// Older copy of the archive to reuse content from
    pub old_file: Option<PathBuf>,
}

impl DownloadArgs {
    /// Builds the repository request these arguments describe.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin id is invalid or the combination of
    /// arguments does not name exactly one artifact.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_cli::commands::download::DownloadArgs;
    /// use marketplace_client::DownloadRequest;
    ///
    /// let args = DownloadArgs {
    ///     update_id: Some(42),
    ///     ..Default::default()
    /// };
    /// assert!(matches!(args.request().unwrap(), DownloadRequest::Update(_)));
    /// ```
    pub fn request(&self) -> Result<DownloadRequest> {
        let channel = Channel::parse(self.channel.as_deref().unwrap_or_default());

        match (&self.plugin, self.update_id) {
            (None, Some(id)) => Ok(DownloadRequest::Update(UpdateId::new(id))),
            (Some(plugin), None) => {
                let plugin = PluginXmlId::new(plugin.as_str())?;
                match (&self.version, &self.ide_build) {
                    (Some(version), None) => Ok(DownloadRequest::Version {
                        plugin,
                        version: version.clone(),
                        channel,
                    }),
                    (None, Some(ide_build)) => Ok(DownloadRequest::LatestCompatible {
                        plugin,
                        ide_build: ide_build.clone(),
                        channel,
                    }),
                    _ => bail!("--plugin needs exactly one of --version or --ide-build"),
                }
            }
            (Some(_), Some(_)) => bail!("--plugin and --update-id cannot be combined"),
            (None, None) => bail!("either --plugin or --update-id is required"),
        }
    }
}

/// Result of a `download` invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadReport {
    /// What was requested
    pub request: String,
    /// Whether an archive was written
    pub downloaded: bool,
    /// Where the archive was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Archive size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// `full` or `delta`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<&'static str>,
    /// Delta statistics, present only for delta downloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<DeltaReport>,
}

/// Transfer statistics of a delta download.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeltaReport {
    /// Bytes copied from the old file
    pub reused_bytes: u64,
    /// Bytes fetched over range requests
    pub fetched_bytes: u64,
    /// Number of range requests
    pub range_requests: usize,
    /// Share of the new file that was fetched, in percent
    pub download_percent: f64,
}

impl DownloadReport {
    /// Describes the outcome of `request`.
    #[must_use]
    pub fn new(request: &DownloadRequest, download: Option<&Download>) -> Self {
        let Some(download) = download else {
            return Self {
                request: request.to_string(),
                downloaded: false,
                path: None,
                size: None,
                method: None,
                delta: None,
            };
        };

        let (method, delta) = match download.method {
            DownloadMethod::Full => ("full", None),
            DownloadMethod::Delta {
                reused,
                fetched,
                range_requests,
                download_fraction,
            } => (
                "delta",
                Some(DeltaReport {
                    reused_bytes: reused,
                    fetched_bytes: fetched,
                    range_requests,
                    download_percent: (download_fraction * 1000.0).round() / 10.0,
                }),
            ),
        };

        Self {
            request: request.to_string(),
            downloaded: true,
            path: Some(download.path.clone()),
            size: Some(download.size),
            method: Some(method),
            delta,
        }
    }
}

/// Runs `request` against `repository` and reports the outcome.
///
/// Cancellation maps to [`ExitCode::INTERRUPTED`] and transport failures to
/// [`ExitCode::NETWORK_ERROR`]; a missing artifact is
/// [`ExitCode::NOT_DOWNLOADED`].
pub async fn execute(
    repository: &PluginRepository,
    request: &DownloadRequest,
    to: &Path,
    old_file: Option<&Path>,
) -> Result<(ExitCode, DownloadReport)> {
    let result = match old_file {
        Some(old) => repository.download_via_block_map(request, to, old).await,
        None => repository.download(request, to).await,
    };

    let download = match result {
        Ok(download) => download,
        Err(e) if e.is_interrupted() => {
            tracing::warn!(%request, "download interrupted");
            return Ok((ExitCode::INTERRUPTED, DownloadReport::new(request, None)));
        }
        Err(e) if e.is_network_error() => {
            tracing::error!(%request, error = %e, "download failed");
            return Ok((ExitCode::NETWORK_ERROR, DownloadReport::new(request, None)));
        }
        Err(e) => return Err(e.into()),
    };

    let code = if download.is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::NOT_DOWNLOADED
    };
    Ok((code, DownloadReport::new(request, download.as_ref())))
}

/// Runs the download command.
///
/// Arguments that do not name exactly one artifact exit with
/// [`ExitCode::INVALID_INPUT`].
pub async fn run(
    args: &DownloadArgs,
    config: &ClientConfig,
    cancel: CancellationToken,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let request = match args.request() {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "invalid download arguments");
            return Ok(ExitCode::INVALID_INPUT);
        }
    };
    let repository = PluginRepository::new(config)?.with_cancellation(cancel);

    let (code, report) = execute(&repository, &request, &args.to, args.old_file.as_deref()).await?;
    println!("{}", format_output(&report, output_format)?);
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_version() -> DownloadArgs {
        DownloadArgs {
            plugin: Some("org.rust.lang".to_string()),
            version: Some("0.4.200".to_string()),
            to: PathBuf::from("."),
            ..Default::default()
        }
    }

    #[test]
    fn test_request_by_version() {
        let request = by_version().request().unwrap();
        assert_eq!(
            request,
            DownloadRequest::Version {
                plugin: PluginXmlId::new("org.rust.lang").unwrap(),
                version: "0.4.200".to_string(),
                channel: Channel::Default,
            }
        );
    }

    #[test]
    fn test_request_default_channel_placeholder() {
        let args = DownloadArgs {
            channel: Some("_default_".to_string()),
            ..by_version()
        };
        assert!(matches!(
            args.request().unwrap(),
            DownloadRequest::Version { channel: Channel::Default, .. }
        ));
    }

    #[test]
    fn test_request_latest_compatible() {
        let args = DownloadArgs {
            version: None,
            ide_build: Some("IU-243.21565.193".to_string()),
            channel: Some("eap".to_string()),
            ..by_version()
        };
        let DownloadRequest::LatestCompatible { ide_build, channel, .. } = args.request().unwrap()
        else {
            panic!("expected LatestCompatible");
        };
        assert_eq!(ide_build, "IU-243.21565.193");
        assert_eq!(channel, Channel::parse("eap"));
    }

    #[test]
    fn test_request_rejects_ambiguous_arguments() {
        let both = DownloadArgs {
            update_id: Some(7),
            ..by_version()
        };
        assert!(both.request().is_err());

        let neither = DownloadArgs::default();
        assert!(neither.request().is_err());

        let no_version = DownloadArgs {
            version: None,
            ..by_version()
        };
        assert!(no_version.request().is_err());

        let bad_id = DownloadArgs {
            plugin: Some(String::new()),
            ..by_version()
        };
        assert!(bad_id.request().is_err());
    }

    #[tokio::test]
    async fn test_run_invalid_arguments_exit_code() {
        let args = DownloadArgs {
            update_id: Some(7),
            ..by_version()
        };
        let code = run(
            &args,
            &ClientConfig::default(),
            CancellationToken::new(),
            OutputFormat::Json,
        )
        .await
        .unwrap();
        assert_eq!(code, ExitCode::INVALID_INPUT);
    }

    #[test]
    fn test_report_not_downloaded() {
        let request = DownloadRequest::Update(UpdateId::new(9));
        let report = DownloadReport::new(&request, None);
        assert!(!report.downloaded);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("path").is_none());
        assert!(json.get("delta").is_none());
    }

    #[test]
    fn test_report_delta_download() {
        let request = DownloadRequest::Update(UpdateId::new(9));
        let download = Download {
            path: PathBuf::from("plugin.zip"),
            size: 1000,
            method: DownloadMethod::Delta {
                reused: 900,
                fetched: 100,
                range_requests: 1,
                download_fraction: 0.1,
            },
        };
        let report = DownloadReport::new(&request, Some(&download));
        assert!(report.downloaded);
        assert_eq!(report.method, Some("delta"));
        let delta = report.delta.unwrap();
        assert_eq!(delta.fetched_bytes, 100);
        assert!((delta.download_percent - 10.0).abs() < f64::EPSILON);
    }
}
