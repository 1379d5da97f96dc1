//! # CacheKit Net
//!
//! Asset fetching for the CacheKit synchronizer.
//!
//! ## Design Goals
//!
//! 1. **Injectable seam**: the synchronizer talks to [`AssetFetcher`], never
//!    to a concrete client, so tests substitute in-memory fetchers
//! 2. **Cache-bypass fetches**: [`FetchMode::Reload`] forces intermediaries
//!    to revalidate, for staging the application shell
//! 3. **Transient-failure tolerance**: GET fetches retry under a
//!    [`RetryPolicy`]

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cachekit_common::{retry_async, RetryPolicy};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

/// Errors that can occur while fetching an asset.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// How a fetch should interact with intermediate HTTP caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Normal conditional caching.
    #[default]
    Default,
    /// Bypass intermediate caches so the response is always current.
    Reload,
}

/// A request for one asset.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub url: Url,
    pub method: Method,
    pub mode: FetchMode,
    pub headers: HeaderMap,
}

impl AssetRequest {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            mode: FetchMode::Default,
            headers: HeaderMap::new(),
        }
    }

    /// Set the cache mode.
    pub fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether this is a read request (only GETs are cacheable).
    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }
}

/// A fetched asset: the response payload plus enough metadata to cache it.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchedAsset {
    /// Check if the fetch was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }
}

/// The network seam consumed by the synchronizer.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch one asset. A resolved response with a non-success status is
    /// `Ok`; only transport-level failures are `Err`.
    async fn fetch(&self, request: &AssetRequest) -> Result<FetchedAsset, FetchError>;
}

/// HTTP fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// User agent string.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "CacheKit/0.1".to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// [`AssetFetcher`] over HTTP, backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    /// Create a new HTTP fetcher.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(&self, request: &AssetRequest) -> Result<FetchedAsset, FetchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        for (name, value) in mode_headers(request.mode) {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "response received"
        );

        Ok(FetchedAsset {
            url,
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<FetchedAsset, FetchError> {
        debug!(url = %request.url, mode = ?request.mode, "fetching asset");

        if request.is_read() {
            retry_async(&self.retry, || self.send_once(request)).await
        } else {
            self.send_once(request).await
        }
    }
}

/// Extra headers implied by a fetch mode.
fn mode_headers(mode: FetchMode) -> Vec<(HeaderName, HeaderValue)> {
    match mode {
        FetchMode::Default => Vec::new(),
        FetchMode::Reload => vec![
            (
                http::header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache"),
            ),
            (http::header::PRAGMA, HeaderValue::from_static("no-cache")),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_request_builder() {
        let url = Url::parse("https://example.com/app.js").unwrap();
        let request = AssetRequest::get(url.clone()).with_mode(FetchMode::Reload);

        assert_eq!(request.url, url);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.mode, FetchMode::Reload);
        assert!(request.is_read());
    }

    #[test]
    fn test_reload_mode_headers() {
        let headers = mode_headers(FetchMode::Reload);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].1, HeaderValue::from_static("no-cache"));

        assert!(mode_headers(FetchMode::Default).is_empty());
    }

    #[tokio::test]
    async fn test_http_fetcher_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app.js"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"shell".to_vec()))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetcherConfig::default())
            .unwrap()
            .with_retry(RetryPolicy::none());
        let url = Url::parse(&format!("{}/app.js", server.uri())).unwrap();
        let asset = fetcher.fetch(&AssetRequest::get(url)).await.unwrap();

        assert!(asset.ok());
        assert_eq!(asset.body.as_ref(), b"shell");
    }

    #[tokio::test]
    async fn test_http_fetcher_non_success_is_ok_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetcherConfig::default())
            .unwrap()
            .with_retry(RetryPolicy::none());
        let url = Url::parse(&format!("{}/missing.png", server.uri())).unwrap();
        let asset = fetcher.fetch(&AssetRequest::get(url)).await.unwrap();

        assert!(!asset.ok());
        assert_eq!(asset.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reload_mode_sends_no_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .and(header("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetcherConfig::default())
            .unwrap()
            .with_retry(RetryPolicy::none());
        let url = Url::parse(&format!("{}/index.html", server.uri())).unwrap();
        let asset = fetcher
            .fetch(&AssetRequest::get(url).with_mode(FetchMode::Reload))
            .await
            .unwrap();

        assert!(asset.ok());
    }
}
