//! Request/response types and the network transport.
//!
//! ### URL Canonicalization
//! - Trim whitespace, require an absolute URL
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Transport
//! - [`Fetcher`] is the seam between the worker and the network.
//! - [`HttpFetcher`] implements it with reqwest.
//! - A fetch only fails when no response arrives; any status is a response.

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use std::time::{Duration, Instant};

pub use url::{UrlError, canonicalize, is_extension_scheme};

use swcache_core::cache::key::compute_cache_key;
use swcache_core::{AppConfig, CachedResponse, Error};

/// An outbound page request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self, Error> {
        let url = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self { method, url, headers: HeaderMap::new() })
    }

    pub fn get(url: &str) -> Result<Self, Error> {
        Self::new(Method::GET, url)
    }

    /// Build a request from a textual method such as `"get"` or `"PATCH"`.
    pub fn parse(method: &str, url: &str) -> Result<Self, Error> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid method: {method:?}")))?;
        Self::new(method, url)
    }

    pub fn cache_key(&self) -> String {
        compute_cache_key(self.method.as_str(), self.url.as_str())
    }

    pub fn is_extension(&self) -> bool {
        is_extension_scheme(&self.url)
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
}

/// A response delivered to the page.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
    /// Capture time, set on responses served from a store.
    pub captured_at: Option<DateTime<Utc>>,
}

impl Response {
    /// True for 2xx statuses, the only responses worth storing.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Snapshot this response for storage under `method` + its URL.
    pub fn to_cached(&self, method: &Method) -> CachedResponse {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        CachedResponse {
            method: method.as_str().to_string(),
            url: self.url.to_string(),
            status: self.status.as_u16(),
            headers,
            body: self.body.to_vec(),
            stored_at: Utc::now().to_rfc3339(),
        }
    }

    /// Rebuild a response from a stored snapshot.
    pub fn from_cached(entry: CachedResponse) -> Result<Self, Error> {
        let captured_at = entry.stored_at();
        let url = Url::parse(&entry.url).map_err(|e| Error::CorruptEntry(format!("url {}: {e}", entry.url)))?;
        let status = StatusCode::from_u16(entry.status)
            .map_err(|e| Error::CorruptEntry(format!("status {}: {e}", entry.status)))?;

        let mut headers = HeaderMap::with_capacity(entry.headers.len());
        for (name, value) in &entry.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::CorruptEntry(format!("header name {name:?}: {e}")))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| Error::CorruptEntry(format!("header value {value:?}: {e}")))?;
            headers.append(name, value);
        }

        Ok(Self { url, status, headers, body: Bytes::from(entry.body), source: ResponseSource::Cache, captured_at })
    }
}

/// The network, as seen by the worker.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request.
    ///
    /// Returns `Error::Network` only when no response was received.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "swcache/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "swcache/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), ..Default::default() }
    }
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: &FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();

        let response = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(|e| Error::Network(format!("{} {}: {}", request.method, request.url, e)))?;

        let status = response.status();
        let headers = response.headers().clone();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {}", e)))?;

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status.as_u16(),
            start.elapsed().as_millis(),
            body.len()
        );

        // Keyed by the original request URL, not the post-redirect one.
        Ok(Response {
            url: request.url.clone(),
            status,
            headers,
            body,
            source: ResponseSource::Network,
            captured_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "swcache/0.1");
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "test-agent".into(), timeout_ms: 500, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_request_cache_key_ignores_fragment() {
        let a = Request::get("https://example.com/index.html#top").unwrap();
        let b = Request::get("https://EXAMPLE.com/index.html").unwrap();
        assert_eq!(a.cache_key(), b.cache_key());

        let post = Request::new(Method::POST, "https://example.com/index.html").unwrap();
        assert_ne!(a.cache_key(), post.cache_key());
    }

    #[test]
    fn test_request_parse_method() {
        let request = Request::parse("patch", "https://example.com/api/auth/user").unwrap();
        assert_eq!(request.method, Method::PATCH);
        assert!(matches!(Request::parse("", "https://example.com/"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_request_invalid_url() {
        assert!(matches!(Request::get("not a url"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_response_snapshot_roundtrip() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        headers.append(header::VARY, HeaderValue::from_static("accept"));
        headers.append(header::VARY, HeaderValue::from_static("origin"));
        let response = Response {
            url: Url::parse("https://example.com/logo.png").unwrap(),
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"png"),
            source: ResponseSource::Network,
            captured_at: None,
        };

        let cached = response.to_cached(&Method::GET);
        assert_eq!(cached.method, "GET");
        assert_eq!(cached.status, 200);
        assert_eq!(cached.headers.len(), 3);

        let restored = Response::from_cached(cached).unwrap();
        assert_eq!(restored.source, ResponseSource::Cache);
        assert!(restored.captured_at.is_some());
        assert_eq!(restored.headers.get_all(header::VARY).iter().count(), 2);
        assert_eq!(restored.body, response.body);
    }

    #[test]
    fn test_response_from_corrupt_entry() {
        let entry = CachedResponse {
            method: "GET".into(),
            url: "https://example.com/".into(),
            status: 42,
            headers: Vec::new(),
            body: Vec::new(),
            stored_at: Utc::now().to_rfc3339(),
        };
        assert!(matches!(Response::from_cached(entry), Err(Error::CorruptEntry(_))));
    }

    #[test]
    fn test_fetcher_new() {
        assert!(HttpFetcher::new(&FetchConfig::default()).is_ok());
    }
}
