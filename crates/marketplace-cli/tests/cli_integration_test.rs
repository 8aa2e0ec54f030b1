//! End-to-end tests: sidecars written by `blockmap` drive delta downloads
//! through `download`, and `plan` predicts what those downloads fetch.

use async_trait::async_trait;
use marketplace_blockmap::ChunkingParams;
use marketplace_cli::commands::{blockmap, download, plan};
use marketplace_client::{
    DownloadRequest, HttpRequest, HttpResponse, PluginRepository, Result, Transport, Url,
};
use marketplace_core::cli::ExitCode;
use marketplace_core::{ClientConfig, UpdateId};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const HOST: &str = "https://mirror.example.com";
const ARTIFACT: &str = "plugin-2.0.zip";

fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state.to_le_bytes()[0]
        })
        .collect()
}

/// Static file mirror over a directory.
///
/// `/plugin/download` resolves to the published artifact. Single ranges are
/// answered with a plain `206` body, several with `multipart/byteranges`.
struct Mirror {
    root: PathBuf,
    ranges: Mutex<usize>,
}

impl Mirror {
    fn range_requests(&self) -> usize {
        *self.ranges.lock().unwrap()
    }
}

fn header_map(content_type: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
    headers
}

fn parse_ranges(header: &str) -> Vec<(usize, usize)> {
    header
        .trim_start_matches("bytes=")
        .split(',')
        .map(|part| {
            let (start, end) = part.split_once('-').unwrap();
            (start.parse().unwrap(), end.parse().unwrap())
        })
        .collect()
}

#[async_trait]
impl Transport for Mirror {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = if request.url.path() == "/plugin/download" {
            Url::parse(&format!("{HOST}/{ARTIFACT}")).unwrap()
        } else {
            request.url.clone()
        };
        let path = self.root.join(url.path().trim_start_matches('/'));
        let Ok(data) = std::fs::read(&path) else {
            return Ok(HttpResponse::from_bytes(404, url, HeaderMap::new(), Vec::new()));
        };

        let Some(range) = &request.range else {
            return Ok(HttpResponse::from_bytes(
                200,
                url,
                header_map("application/zip"),
                data,
            ));
        };

        *self.ranges.lock().unwrap() += 1;
        let ranges = parse_ranges(range);
        if let [(start, end)] = ranges[..] {
            let mut headers = header_map("application/zip");
            headers.insert(
                "Content-Range",
                HeaderValue::from_str(&format!("bytes {start}-{end}/{}", data.len())).unwrap(),
            );
            return Ok(HttpResponse::from_bytes(
                206,
                url,
                headers,
                data[start..=end].to_vec(),
            ));
        }

        let mut body = Vec::new();
        for (start, end) in ranges {
            body.extend_from_slice(b"--SEP\r\nContent-Type: application/zip\r\n");
            body.extend_from_slice(
                format!("Content-Range: bytes {start}-{end}/{}\r\n\r\n", data.len()).as_bytes(),
            );
            body.extend_from_slice(&data[start..=end]);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b"--SEP--\r\n");
        Ok(HttpResponse::from_bytes(
            206,
            url,
            header_map("multipart/byteranges; boundary=SEP"),
            body,
        ))
    }
}

struct Setup {
    _dir: TempDir,
    mirror: Arc<Mirror>,
    old_file: PathBuf,
    new_file: PathBuf,
    out_dir: PathBuf,
}

/// Publishes `new` on a mirror with sidecars and keeps `old` locally.
fn setup(old: &[u8], new: &[u8]) -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("mirror");
    let out_dir = dir.path().join("out");
    std::fs::create_dir(&root).unwrap();
    std::fs::create_dir(&out_dir).unwrap();

    let new_file = root.join(ARTIFACT);
    std::fs::write(&new_file, new).unwrap();
    blockmap::write_sidecars(&new_file, &root, ChunkingParams::default()).unwrap();

    let old_file = dir.path().join("plugin-1.0.zip");
    std::fs::write(&old_file, old).unwrap();

    Setup {
        _dir: dir,
        mirror: Arc::new(Mirror {
            root,
            ranges: Mutex::new(0),
        }),
        old_file,
        new_file,
        out_dir,
    }
}

fn repository(mirror: &Arc<Mirror>) -> PluginRepository {
    let config = ClientConfig::builder().host(HOST).build();
    PluginRepository::with_transport(&config, Arc::clone(mirror) as Arc<dyn Transport>).unwrap()
}

fn request() -> DownloadRequest {
    DownloadRequest::Update(UpdateId::new(2))
}

fn edited(base: &[u8]) -> Vec<u8> {
    let mut new = base.to_vec();
    new.splice(100_000..100_000, noise(3_000, 11));
    new[300_000..302_000].copy_from_slice(&noise(2_000, 12));
    new
}

#[tokio::test]
async fn test_delta_download_from_published_sidecars() {
    let old = noise(500_000, 5);
    let new = edited(&old);
    let s = setup(&old, &new);

    let (code, report) = download::execute(
        &repository(&s.mirror),
        &request(),
        &s.out_dir,
        Some(&s.old_file),
    )
    .await
    .unwrap();

    assert_eq!(code, ExitCode::SUCCESS);
    assert_eq!(report.method, Some("delta"));
    let delta = report.delta.unwrap();
    assert!(delta.reused_bytes > delta.fetched_bytes);
    assert_eq!(delta.range_requests, s.mirror.range_requests());

    let written = report.path.unwrap();
    assert_eq!(written, s.out_dir.join(ARTIFACT));
    assert_eq!(std::fs::read(written).unwrap(), new);
}

#[tokio::test]
async fn test_plan_matches_download() {
    let old = noise(500_000, 5);
    let new = edited(&old);
    let s = setup(&old, &new);

    let planned = plan::plan(&s.old_file, &s.new_file, ChunkingParams::default(), 0.65).unwrap();
    let (_, report) = download::execute(
        &repository(&s.mirror),
        &request(),
        &s.out_dir,
        Some(&s.old_file),
    )
    .await
    .unwrap();

    let delta = report.delta.unwrap();
    assert_eq!(delta.fetched_bytes, planned.missing_bytes);
    assert_eq!(delta.range_requests, planned.range_requests);
    assert_eq!(report.size, Some(planned.new_size));
}

#[tokio::test]
async fn test_unrelated_old_file_downloads_in_full() {
    let s = setup(&noise(200_000, 1), &noise(200_000, 2));

    let (code, report) = download::execute(
        &repository(&s.mirror),
        &request(),
        &s.out_dir,
        Some(&s.old_file),
    )
    .await
    .unwrap();

    assert_eq!(code, ExitCode::SUCCESS);
    assert_eq!(report.method, Some("full"));
    assert!(report.delta.is_none());
    assert_eq!(s.mirror.range_requests(), 0);
    assert_eq!(
        std::fs::read(s.out_dir.join(ARTIFACT)).unwrap(),
        std::fs::read(&s.new_file).unwrap()
    );
}

#[tokio::test]
async fn test_missing_artifact_is_not_downloaded() {
    let s = setup(b"old", b"new");
    std::fs::remove_file(&s.new_file).unwrap();

    let (code, report) = download::execute(&repository(&s.mirror), &request(), &s.out_dir, None)
        .await
        .unwrap();

    assert_eq!(code, ExitCode::NOT_DOWNLOADED);
    assert!(!report.downloaded);
    assert_eq!(std::fs::read_dir(&s.out_dir).unwrap().count(), 0);
}

#[test]
fn test_sidecar_names_follow_artifact() {
    let s = setup(b"old", &noise(10_000, 4));
    let root: &Path = &s.mirror.root;
    assert!(root.join(format!("{ARTIFACT}.blockmap.zip")).is_file());
    assert!(root.join(format!("{ARTIFACT}.hash.json")).is_file());
}
