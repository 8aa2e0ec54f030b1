//! `blockmap` command.
//!
//! Writes the `.blockmap.zip` and `.hash.json` sidecars for an archive so
//! any static file server can offer delta updates for it.

use crate::formatters::format_output;
use anyhow::{Context, Result};
use marketplace_blockmap::{
    BLOCKMAP_ZIP_SUFFIX, BlockMap, ChunkingParams, FileHash, HASH_FILENAME_SUFFIX, HashAlgorithm,
};
use marketplace_core::cli::{ExitCode, OutputFormat};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Sidecars written for one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SidecarReport {
    /// Archive the sidecars describe
    pub file: PathBuf,
    /// Archive size in bytes
    pub size: u64,
    /// Number of chunks in the block map
    pub chunks: usize,
    /// Digest algorithm
    pub algorithm: String,
    /// Written block map sidecar
    pub block_map: PathBuf,
    /// Written hash sidecar
    pub hash_file: PathBuf,
    /// Whole-file digest as `ALGORITHM:base64`
    pub hash: String,
}

/// Chunks and hashes `file`, writing both sidecars into `out_dir`.
///
/// # Errors
///
/// Returns an error if `file` has no file name, cannot be read, or the
/// sidecars cannot be written.
pub fn write_sidecars(file: &Path, out_dir: &Path, params: ChunkingParams) -> Result<SidecarReport> {
    let name = file
        .file_name()
        .with_context(|| format!("{} has no file name", file.display()))?
        .to_string_lossy();

    let map = BlockMap::from_file(file, params)
        .with_context(|| format!("failed to chunk {}", file.display()))?;
    let reader = BufReader::new(File::open(file)?);
    let hash = FileHash::from_reader(params.algorithm, reader)?;

    let block_map = out_dir.join(format!("{name}{BLOCKMAP_ZIP_SUFFIX}"));
    let hash_file = out_dir.join(format!("{name}{HASH_FILENAME_SUFFIX}"));
    std::fs::write(&block_map, map.to_zip()?)
        .with_context(|| format!("failed to write {}", block_map.display()))?;
    std::fs::write(&hash_file, hash.to_json()?)
        .with_context(|| format!("failed to write {}", hash_file.display()))?;

    tracing::info!(
        file = %file.display(),
        chunks = map.chunks.len(),
        block_map = %block_map.display(),
        "wrote sidecars"
    );
    Ok(SidecarReport {
        file: file.to_path_buf(),
        size: map.total_size(),
        chunks: map.chunks.len(),
        algorithm: params.algorithm.to_string(),
        block_map,
        hash_file,
        hash: hash.to_string(),
    })
}

/// Runs the blockmap command.
///
/// Sidecars go next to `file` unless `out_dir` is given.
pub async fn run(
    file: PathBuf,
    algorithm: Option<&str>,
    out_dir: Option<PathBuf>,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let algorithm: HashAlgorithm = match algorithm {
        Some(name) => name.parse()?,
        None => HashAlgorithm::default(),
    };
    let params = ChunkingParams {
        algorithm,
        ..ChunkingParams::default()
    };
    let out_dir = match out_dir {
        Some(dir) => dir,
        None => file
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
    };

    let report =
        tokio::task::spawn_blocking(move || write_sidecars(&file, &out_dir, params)).await??;
    println!("{}", format_output(&report, output_format)?);
    Ok(ExitCode::SUCCESS)
}
