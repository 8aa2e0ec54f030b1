//! HTTP seam between the download logic and the network.
//!
//! Everything above this module talks to a [`Transport`]. Production code
//! uses [`ReqwestTransport`]; tests plug in in-memory implementations.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use marketplace_core::ClientConfig;
use reqwest::Url;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RANGE};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::io::StreamReader;

const ERROR_BODY_LIMIT: u64 = 4096;

/// A `GET` request, optionally restricted to byte ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Target URL
    pub url: Url,
    /// Value of the `Range` header, if any
    pub range: Option<String>,
}

impl HttpRequest {
    /// Creates a plain `GET` request.
    #[must_use]
    pub const fn get(url: Url) -> Self {
        Self { url, range: None }
    }

    /// Adds a `Range` header value such as `bytes=0-99,200-299`.
    #[must_use]
    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }
}

/// Response with a streaming body.
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Final URL after redirects
    pub url: Url,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Box<dyn AsyncBufRead + Send + Unpin>,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Creates a response over any buffered reader.
    pub fn new<B>(status: u16, url: Url, headers: HeaderMap, body: B) -> Self
    where
        B: AsyncBufRead + Send + Unpin + 'static,
    {
        Self {
            status,
            url,
            headers,
            body: Box::new(body),
        }
    }

    /// Creates a response with an in-memory body.
    #[must_use]
    pub fn from_bytes(status: u16, url: Url, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self::new(status, url, headers, io::Cursor::new(body))
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns a header value if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Reads the whole body, failing if it exceeds `limit` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if reading fails or the body is too large.
    pub async fn bytes(mut self, limit: u64) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        (&mut self.body).take(limit + 1).read_to_end(&mut out).await?;
        if u64::try_from(out.len()).unwrap_or(u64::MAX) > limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("response body exceeds {limit} bytes"),
            )
            .into());
        }
        Ok(out)
    }

    /// Reads a short diagnostic from an error response.
    ///
    /// Returns `": <text>"`, or an empty string when the body is empty or
    /// unreadable.
    pub async fn error_message(mut self) -> String {
        let mut out = Vec::new();
        if (&mut self.body)
            .take(ERROR_BODY_LIMIT)
            .read_to_end(&mut out)
            .await
            .is_err()
        {
            return String::new();
        }
        let text = String::from_utf8_lossy(&out);
        let text = text.trim();
        if text.is_empty() {
            String::new()
        } else {
            format!(": {text}")
        }
    }
}

/// Issues HTTP `GET` requests.
///
/// Redirects are followed by the implementation; [`HttpResponse::url`]
/// reports where the body actually came from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the response head with a streaming body.
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a shared `reqwest` client.
///
/// Concurrent requests are bounded by `max_parallel_connections`; a permit is
/// held until the response body is dropped.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl ReqwestTransport {
    /// Builds a transport from client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the configuration is invalid and
    /// [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(config.max_parallel_connections)
            .build()?;
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_parallel_connections)),
        })
    }

    /// Number of requests that can start without waiting.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ClientError::Interrupted)?;

        tracing::debug!(
            url = %request.url,
            range = request.range.as_deref().unwrap_or("-"),
            "sending request"
        );

        let mut builder = self.client.get(request.url);
        if let Some(range) = request.range {
            builder = builder.header(RANGE, range);
        }
        let response = builder.send().await?;

        let status = response.status().as_u16();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let stream = response.bytes_stream().map_err(io::Error::other).boxed();
        let body = PermitBody {
            inner: Box::new(StreamReader::new(stream)),
            _permit: permit,
        };

        Ok(HttpResponse::new(status, url, headers, body))
    }
}

/// Body reader that releases its connection permit when dropped.
struct PermitBody {
    inner: Box<dyn AsyncBufRead + Send + Unpin>,
    _permit: OwnedSemaphorePermit,
}

impl AsyncRead for PermitBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncBufRead for PermitBody {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().inner).poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        Pin::new(&mut self.get_mut().inner).consume(amt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn url() -> Url {
        Url::parse("https://downloads.example.com/files/plugin.zip").unwrap()
    }

    #[tokio::test]
    async fn test_bytes_within_limit() {
        let response = HttpResponse::from_bytes(200, url(), HeaderMap::new(), b"abc".to_vec());
        assert_eq!(response.bytes(3).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_bytes_over_limit() {
        let response = HttpResponse::from_bytes(200, url(), HeaderMap::new(), vec![0; 10]);
        assert!(matches!(
            response.bytes(9).await.unwrap_err(),
            ClientError::Io(_)
        ));
    }

    #[tokio::test]
    async fn test_error_message() {
        let response =
            HttpResponse::from_bytes(500, url(), HeaderMap::new(), b"  overloaded\n".to_vec());
        assert_eq!(response.error_message().await, ": overloaded");

        let empty = HttpResponse::from_bytes(500, url(), HeaderMap::new(), Vec::new());
        assert_eq!(empty.error_message().await, "");
    }

    #[test]
    fn test_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/zip"));
        let response = HttpResponse::from_bytes(206, url(), headers, Vec::new());
        assert!(response.is_success());
        assert_eq!(response.content_type(), Some("application/zip"));
        assert_eq!(response.header("content-type"), Some("application/zip"));
        assert_eq!(response.header("content-disposition"), None);
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::get(url()).with_range("bytes=0-9");
        assert_eq!(request.range.as_deref(), Some("bytes=0-9"));
    }

    #[test]
    fn test_reqwest_transport_permits() {
        let config = ClientConfig::builder().max_parallel_connections(3).build();
        let transport = ReqwestTransport::new(&config).unwrap();
        assert_eq!(transport.available_permits(), 3);
    }

    #[test]
    fn test_reqwest_transport_rejects_invalid_config() {
        let config = ClientConfig::builder().max_parallel_connections(0).build();
        assert!(matches!(
            ReqwestTransport::new(&config).unwrap_err(),
            ClientError::Config(_)
        ));
    }
}
