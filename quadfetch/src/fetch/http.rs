//! HTTP client abstraction for testability

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Status reported when the transfer never produced an HTTP response.
pub const STATUS_TRANSPORT_ERROR: u16 = 0;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default User-Agent string for HTTP requests.
/// Some tile servers reject requests without one.
const DEFAULT_USER_AGENT: &str = concat!("quadfetch/", env!("CARGO_PKG_VERSION"));

/// Errors raised while building an HTTP client.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),

    #[error("Failed to spawn fetch worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Outcome of a single HTTP transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code, or [`STATUS_TRANSPORT_ERROR`]
    pub status: u16,
    /// Response body. Empty unless the request succeeded.
    pub content: Bytes,
}

impl HttpResponse {
    /// A successful response carrying `content`.
    pub fn ok(content: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            content: content.into(),
        }
    }

    /// A failure with the given status and no body.
    pub fn failed(status: u16) -> Self {
        Self {
            status,
            content: Bytes::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Blocking HTTP GET.
///
/// Each fetch worker owns one client for its whole lifetime, so
/// implementations may keep connection state in `&mut self`. Failures are
/// reported in the response status rather than as errors: transport errors
/// and timeouts use [`STATUS_TRANSPORT_ERROR`].
pub trait HttpClient: Send {
    fn fetch(&mut self, url: &str) -> HttpResponse;
}

/// Builds one [`HttpClient`] per fetch worker.
pub type ClientFactory = Box<dyn Fn() -> Box<dyn HttpClient> + Send + Sync>;

/// Real HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a new ReqwestClient with custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }

    /// Returns a factory that builds one client per worker.
    ///
    /// A first client is built eagerly so configuration errors surface
    /// here instead of inside a worker thread. Workers whose own client
    /// fails to build share that first client's connection pool.
    pub fn factory(timeout: Duration) -> Result<ClientFactory, FetchError> {
        let fallback = Self::with_timeout(timeout)?;
        Ok(Box::new(move || -> Box<dyn HttpClient> {
            match Self::with_timeout(timeout) {
                Ok(client) => Box::new(client),
                Err(e) => {
                    warn!(error = %e, "Worker HTTP client failed to build, sharing one");
                    Box::new(fallback.clone())
                }
            }
        }))
    }
}

impl HttpClient for ReqwestClient {
    fn fetch(&mut self, url: &str) -> HttpResponse {
        trace!(url = url, "HTTP GET request starting");

        let response = match self.client.get(url).send() {
            Ok(resp) => resp,
            Err(e) => {
                warn!(
                    url = url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                return HttpResponse::failed(STATUS_TRANSPORT_ERROR);
            }
        };

        let status = response.status().as_u16();
        if status != 200 {
            debug!(url = url, status = status, "HTTP error status");
            return HttpResponse::failed(status);
        }

        match response.bytes() {
            Ok(content) => HttpResponse { status, content },
            Err(e) => {
                warn!(url = url, error = %e, "Failed to read response body");
                HttpResponse::failed(STATUS_TRANSPORT_ERROR)
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Mock HTTP client serving canned responses by URL.
    #[derive(Clone, Default)]
    pub struct MockHttpClient {
        pub responses: Arc<HashMap<String, HttpResponse>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl MockHttpClient {
        pub fn with(responses: &[(&str, HttpResponse)]) -> Self {
            Self {
                responses: Arc::new(
                    responses
                        .iter()
                        .map(|(url, r)| (url.to_string(), r.clone()))
                        .collect(),
                ),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl HttpClient for MockHttpClient {
        fn fetch(&mut self, url: &str) -> HttpResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(url)
                .cloned()
                .unwrap_or_else(|| HttpResponse::failed(404))
        }
    }

    #[test]
    fn test_mock_client_success() {
        let mut client = MockHttpClient::with(&[("http://t/1", HttpResponse::ok("tile"))]);
        let response = client.fetch("http://t/1");
        assert!(response.is_success());
        assert_eq!(&response.content[..], b"tile");
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mock_client_not_found() {
        let mut client = MockHttpClient::default();
        let response = client.fetch("http://t/missing");
        assert_eq!(response.status, 404);
        assert!(response.content.is_empty());
    }

    #[test]
    fn test_failed_response_is_not_success() {
        assert!(!HttpResponse::failed(STATUS_TRANSPORT_ERROR).is_success());
        assert!(!HttpResponse::failed(500).is_success());
        assert!(HttpResponse::ok(Bytes::new()).is_success());
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(ReqwestClient::with_timeout(Duration::from_secs(5)).is_ok());
        let factory = ReqwestClient::factory(Duration::from_secs(5)).unwrap();
        let _client = factory();
    }
}
