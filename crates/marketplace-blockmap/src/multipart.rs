//! Parser for `206 Partial Content` responses to range batches.
//!
//! Multi-range responses use `multipart/byteranges`: each part is a boundary
//! line, part headers up to a blank line, then the raw range bytes. Part
//! headers other than `Content-Range` are skipped. A server may answer a
//! single-range request with a plain body instead, which is accepted when
//! the batch holds exactly one range.

use crate::batch::{RangeBatch, RangePart};
use crate::error::{BlockMapError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest line, terminator included, accepted in multipart framing.
pub const MAX_LINE_LENGTH: usize = 1024;

const STATUS_PARTIAL_CONTENT: u16 = 206;
const MULTIPART_BYTERANGES: &str = "multipart/byteranges";

/// Extracts the `boundary` parameter of a `multipart/byteranges` content type.
///
/// Returns `None` for other media types or when the parameter is missing.
///
/// # Examples
///
/// ```
/// use marketplace_blockmap::multipart::boundary_from_content_type;
///
/// assert_eq!(
///     boundary_from_content_type("multipart/byteranges; boundary=3d6b6a416f9b5"),
///     Some("3d6b6a416f9b5".to_string()),
/// );
/// assert_eq!(
///     boundary_from_content_type("Multipart/Byteranges; charset=x; boundary=\"a b\""),
///     Some("a b".to_string()),
/// );
/// assert_eq!(boundary_from_content_type("application/zip"), None);
/// ```
#[must_use]
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let media_type = params.next()?.trim();
    if !media_type.eq_ignore_ascii_case(MULTIPART_BYTERANGES) {
        return None;
    }

    params.find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Reads the chunk payloads of `batch` from a range response body.
///
/// Returns one buffer per chunk, in batch order.
///
/// # Errors
///
/// - [`BlockMapError::UnexpectedStatus`] if `status` is not 206
/// - [`BlockMapError::MissingContentType`] if no content type was sent
/// - [`BlockMapError::MalformedMultipart`] or [`BlockMapError::LineTooLong`]
///   if the framing does not match the batch
/// - [`BlockMapError::Io`] if the body ends early or cannot be read
pub async fn read_range_response<R>(
    status: u16,
    content_type: Option<&str>,
    body: &mut R,
    batch: &RangeBatch,
) -> Result<Vec<Vec<u8>>>
where
    R: AsyncBufRead + Unpin + Send + ?Sized,
{
    if status != STATUS_PARTIAL_CONTENT {
        return Err(BlockMapError::UnexpectedStatus { status });
    }
    let content_type = content_type.ok_or(BlockMapError::MissingContentType)?;

    let mut chunks = Vec::with_capacity(batch.chunk_count());
    match boundary_from_content_type(content_type) {
        Some(boundary) => {
            for part in &batch.parts {
                read_part_headers(body, &boundary, part).await?;
                read_payload(body, part, &mut chunks).await?;
            }
        }
        None if batch.parts.len() == 1 => {
            read_payload(body, &batch.parts[0], &mut chunks).await?;
        }
        None => {
            return Err(BlockMapError::MalformedMultipart {
                expected: format!("{MULTIPART_BYTERANGES} with a boundary"),
                found: content_type.to_string(),
            });
        }
    }

    tracing::debug!(
        chunks = chunks.len(),
        ranges = batch.parts.len(),
        "parsed range response"
    );
    Ok(chunks)
}

async fn read_part_headers<R>(body: &mut R, boundary: &str, part: &RangePart) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send + ?Sized,
{
    // RFC 2046 delimiter: the whole line is `--` plus the boundary.
    let delimiter = format!("--{boundary}");

    loop {
        let line = next_line(body, "boundary line").await?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == delimiter {
            break;
        }
        return Err(BlockMapError::MalformedMultipart {
            expected: format!("boundary line '{delimiter}'"),
            found: line,
        });
    }

    let mut range_seen = false;
    loop {
        let line = next_line(body, "part headers").await?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        let Some((name, value)) = trimmed.split_once(':') else {
            return Err(BlockMapError::MalformedMultipart {
                expected: "part header".to_string(),
                found: line.clone(),
            });
        };
        if name.trim().eq_ignore_ascii_case("content-range") {
            check_content_range(value.trim(), part)?;
            range_seen = true;
        }
    }

    if range_seen {
        Ok(())
    } else {
        Err(BlockMapError::MalformedMultipart {
            expected: format!("Content-Range header for bytes {}-{}", part.start, part.end),
            found: "end of part headers".to_string(),
        })
    }
}

fn check_content_range(value: &str, part: &RangePart) -> Result<()> {
    let parsed = value
        .strip_prefix("bytes")
        .map(str::trim_start)
        .and_then(|spec| spec.split('/').next())
        .and_then(|range| range.split_once('-'))
        .and_then(|(start, end)| {
            Some((start.trim().parse::<u64>().ok()?, end.trim().parse::<u64>().ok()?))
        });

    match parsed {
        Some((start, end)) if start == part.start && end == part.end => Ok(()),
        _ => Err(BlockMapError::MalformedMultipart {
            expected: format!("Content-Range bytes {}-{}", part.start, part.end),
            found: value.to_string(),
        }),
    }
}

async fn read_payload<R>(body: &mut R, part: &RangePart, out: &mut Vec<Vec<u8>>) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send + ?Sized,
{
    for &length in &part.chunk_lengths {
        let mut buf = vec![0u8; length as usize];
        body.read_exact(&mut buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                BlockMapError::MalformedMultipart {
                    expected: format!("{length} payload bytes of range {}-{}", part.start, part.end),
                    found: "end of stream".to_string(),
                }
            } else {
                BlockMapError::Io(e)
            }
        })?;
        out.push(buf);
    }
    Ok(())
}

async fn next_line<R>(body: &mut R, expected: &str) -> Result<String>
where
    R: AsyncBufRead + Unpin + Send + ?Sized,
{
    match read_line_limited(body, MAX_LINE_LENGTH).await? {
        Some(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        None => Err(BlockMapError::MalformedMultipart {
            expected: expected.to_string(),
            found: "end of stream".to_string(),
        }),
    }
}

/// Reads one `\n`-terminated line without buffering more than `limit` bytes.
///
/// Returns `None` at end of stream. A final line without terminator is
/// returned as is.
async fn read_line_limited<R>(body: &mut R, limit: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin + Send + ?Sized,
{
    let mut line = Vec::new();
    loop {
        let available = body.fill_buf().await?;
        if available.is_empty() {
            return Ok((!line.is_empty()).then_some(line));
        }

        let (take, done) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        if line.len() + take > limit {
            return Err(BlockMapError::LineTooLong { limit });
        }
        line.extend_from_slice(&available[..take]);
        body.consume(take);

        if done {
            return Ok(Some(line));
        }
    }
}
