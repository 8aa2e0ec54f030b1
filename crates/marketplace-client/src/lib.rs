//! Download client for the JetBrains Marketplace plugin repository.
//!
//! [`PluginRepository`] downloads plugin archives either in full or, when an
//! older copy is available, incrementally: it reads the block map and hash
//! published next to the artifact, fetches only the chunks the old copy
//! lacks, and verifies the rebuilt file. Any failure of the incremental path
//! falls back to a full download; only cancellation interrupts it.
//!
//! # Architecture
//!
//! ```text
//! PluginRepository ──► Transport (reqwest, bounded by a semaphore)
//!        │
//!        ├─ download ──────────────► save_archive ─► <target>
//!        └─ download_via_block_map ─► DeltaDownloader
//!                                        │ sidecars, diff, range batches
//!                                        ▼
//!                                  marketplace-blockmap ─► <target>
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use marketplace_client::{DownloadRequest, PluginRepository};
//! use marketplace_core::{Channel, ClientConfig, PluginXmlId};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repository = PluginRepository::new(&ClientConfig::load(None)?)?;
//! let request = DownloadRequest::Version {
//!     plugin: PluginXmlId::new("org.rust.lang")?,
//!     version: "0.4.200".to_string(),
//!     channel: Channel::Default,
//! };
//! repository.download(&request, Path::new(".")).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod artifact;
mod error;
mod partial;
mod repository;

pub mod delta;
pub mod download;
pub mod transport;

pub use artifact::{ArtifactLocation, resolve_target, suggested_file_name};
pub use delta::{DeltaDownloader, TransportRangeFetcher};
pub use download::{Download, DownloadMethod};
pub use error::{ClientError, Result};
pub use partial::PartialFile;
pub use repository::{DownloadRequest, PluginRepository};
pub use reqwest::Url;
pub use tokio_util::sync::CancellationToken;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
