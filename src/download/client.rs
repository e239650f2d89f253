//! HTTP client wrapper for fetching media.
//!
//! This module provides the `HttpClient` struct which performs a single GET,
//! reads the whole body into memory, and reports the pieces the coordinator
//! needs (final URL after redirects, status, `Content-Disposition`, bytes).

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_DISPOSITION};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_DOWNLOAD_TIMEOUT_SECS};
use super::error::FetchError;

/// Browser User-Agent sent with every media request.
///
/// Several media hosts refuse or degrade responses for non-browser agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// HTTP client for fetching files.
///
/// Created once and shared across downloads to reuse pooled connections.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// URL after following redirects.
    pub final_url: Url,
    /// HTTP status code.
    pub status: u16,
    /// Raw `Content-Disposition` header, if present.
    pub content_disposition: Option<String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default 60 second request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeout(DEFAULT_DOWNLOAD_TIMEOUT_SECS)
    }

    /// Creates a client with an explicit request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeout(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS.min(timeout_secs)))
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Performs one GET and reads the entire body.
    ///
    /// Error statuses are not errors here: they come back in
    /// [`FetchedResponse::status`] so the caller can classify them.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Request`] if the request cannot be built
    /// - [`FetchError::Network`] / [`FetchError::Timeout`] if sending fails
    /// - [`FetchError::Read`] if the body stream breaks
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let request = self
            .client
            .get(url)
            .header(ACCEPT_ENCODING, "identity")
            .build()
            .map_err(|e| FetchError::request(url, e))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| FetchError::network(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::read(url, e))?;
            body.extend_from_slice(&chunk);
        }

        debug!(status, bytes = body.len(), final_url = %final_url, "response read");

        Ok(FetchedResponse {
            final_url,
            status,
            content_disposition,
            body,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_returns_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.png"))
            .and(header("accept-encoding", "identity"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Disposition", r#"inline; filename="b.png""#)
                    .set_body_bytes(b"\x89PNG\r\n\x1a\n".to_vec()),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let fetched = client
            .fetch(&format!("{}/a.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(fetched.status, 200);
        assert_eq!(fetched.body.len(), 8);
        assert_eq!(
            fetched.content_disposition.as_deref(),
            Some(r#"inline; filename="b.png""#)
        );
        assert!(fetched.final_url.path().ends_with("/a.png"));
    }

    #[tokio::test]
    async fn test_fetch_sends_browser_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", BROWSER_USER_AGENT))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        HttpClient::new().fetch(&server.uri()).await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetched = HttpClient::new().fetch(&server.uri()).await.unwrap();
        assert_eq!(fetched.status, 503);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        // Port 9 (discard) on localhost is not expected to be listening.
        let result = HttpClient::new_with_timeout(5)
            .fetch("http://127.0.0.1:9/a.jpg")
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. } | FetchError::Timeout { .. }));
    }
}
