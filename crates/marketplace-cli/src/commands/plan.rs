//! `plan` command: a local dry run of a delta download.
//!
//! Chunks both archives, diffs them, and reports how much of the new one a
//! delta download would fetch and in how many range requests.

use crate::formatters::format_output;
use anyhow::{Context, Result};
use marketplace_blockmap::{BlockMap, ChunkingParams, RangeBatcher, diff, download_fraction};
use marketplace_core::ClientConfig;
use marketplace_core::cli::{ExitCode, OutputFormat};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Outcome of planning a delta from one archive to another.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReport {
    /// Size of the old archive
    pub old_size: u64,
    /// Size of the new archive
    pub new_size: u64,
    /// Chunks in the new archive
    pub total_chunks: usize,
    /// Chunks the old archive lacks
    pub missing_chunks: usize,
    /// Bytes a delta download would fetch
    pub missing_bytes: u64,
    /// Share of the new archive to fetch, in percent
    pub download_percent: f64,
    /// Range requests a delta download would issue
    pub range_requests: usize,
    /// Whether the savings clear the configured threshold
    pub delta_worthwhile: bool,
}

/// Plans the delta from `old` to `new`.
///
/// # Errors
///
/// Returns an error if either file cannot be read.
pub fn plan(
    old: &Path,
    new: &Path,
    params: ChunkingParams,
    max_download_fraction: f64,
) -> Result<PlanReport> {
    let new_map = BlockMap::from_file(new, params)
        .with_context(|| format!("failed to chunk {}", new.display()))?;
    let old_map = BlockMap::from_file(old, params)
        .with_context(|| format!("failed to chunk {}", old.display()))?;

    let missing = diff(&old_map, &new_map);
    let fraction = download_fraction(&missing, &new_map);
    let missing_bytes = missing.iter().map(|c| u64::from(c.length)).sum();
    let missing_chunks = missing.len();

    let mut batcher = RangeBatcher::new(missing);
    let mut range_requests = 0;
    while !batcher.next_batch().is_empty() {
        range_requests += 1;
    }

    Ok(PlanReport {
        old_size: old_map.total_size(),
        new_size: new_map.total_size(),
        total_chunks: new_map.chunks.len(),
        missing_chunks,
        missing_bytes,
        download_percent: (fraction * 1000.0).round() / 10.0,
        range_requests,
        delta_worthwhile: fraction <= max_download_fraction,
    })
}

/// Runs the plan command.
pub async fn run(
    old: PathBuf,
    new: PathBuf,
    config: &ClientConfig,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let threshold = config.max_download_fraction;
    let report = tokio::task::spawn_blocking(move || {
        plan(&old, &new, ChunkingParams::default(), threshold)
    })
    .await??;
    println!("{}", format_output(&report, output_format)?);
    Ok(ExitCode::SUCCESS)
}
