use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::dto::NewsResponse;

pub const DEFAULT_BASE_URL: &str = "https://newsapi.org/";
pub const DEFAULT_QUERY: &str = "india";
pub const DEFAULT_SORT_BY: &str = "publishedAt";

const EVERYTHING_PATH: &str = "v2/everything";
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching from the search endpoint.
///
/// None of these are retried here; the caller decides.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, timeout). The request URL
    /// is stripped because it carries the API key.
    #[error("Request failed: {0}")]
    Network(reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Body was not a valid search response
    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.without_url())
    }
}

/// Build the shared HTTP client used for all fetches.
///
/// `timeout` bounds the whole request; it is the only timeout a sync
/// attempt is subject to.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("headlines/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Client for the `v2/everything` search endpoint.
#[derive(Clone)]
pub struct NewsClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl NewsClient {
    /// `base_url` is the API root, e.g. `https://newsapi.org/`. A missing
    /// trailing slash is added so the endpoint path joins below it.
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self, FetchError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)
            .and_then(|u| u.join(EVERYTHING_PATH))
            .map_err(|e| FetchError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(FetchError::InvalidBaseUrl(format!(
                "{}: unsupported scheme",
                base_url
            )));
        }
        Ok(Self { http, endpoint })
    }

    /// Fetch one page of search results.
    ///
    /// A parsed body is returned as-is even when its `status` is not `"ok"`;
    /// validating the status is the caller's job.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - connection, TLS or transport timeout
    /// - [`FetchError::HttpStatus`] - non-2xx response
    /// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`]
    /// - [`FetchError::Decode`] - body is not a search response
    pub async fn fetch(
        &self,
        query: &str,
        sort_by: &str,
        api_key: &SecretString,
    ) -> Result<NewsResponse, FetchError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("sortBy", sort_by)
            .append_pair("apiKey", api_key.expose_secret());

        tracing::debug!(
            endpoint = %self.endpoint,
            query = %query,
            sort_by = %sort_by,
            "Fetching articles"
        );

        let response = self.http.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        let body: NewsResponse = serde_json::from_slice(&bytes)?;
        Ok(body)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OK_BODY: &str = r#"{
        "status": "ok",
        "totalResults": 2,
        "articles": [
            {"url": "https://example.com/1", "title": "One", "publishedAt": "2024-01-02T00:00:00Z", "source": {"name": "S"}},
            {"url": "https://example.com/2", "title": "Two", "publishedAt": "2024-01-01T00:00:00Z", "source": {"id": null, "name": "S"}}
        ]
    }"#;

    fn key() -> SecretString {
        SecretString::from("test-key")
    }

    fn client_for(server: &MockServer) -> NewsClient {
        NewsClient::new(reqwest::Client::new(), &server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_sends_search_parameters() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .and(query_param("q", "india"))
            .and(query_param("sortBy", "publishedAt"))
            .and(query_param("apiKey", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(OK_BODY))
            .expect(1)
            .mount(&mock_server)
            .await;

        let response = client_for(&mock_server)
            .fetch(DEFAULT_QUERY, DEFAULT_SORT_BY, &key())
            .await
            .unwrap();

        assert!(response.is_ok());
        assert_eq!(response.articles.len(), 2);
        assert_eq!(response.total_results, Some(2));
    }

    #[tokio::test]
    async fn test_fetch_returns_error_status_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"status":"error","code":"rateLimited","message":"slow down"}"#),
            )
            .mount(&mock_server)
            .await;

        let response = client_for(&mock_server)
            .fetch("rust", "relevancy", &key())
            .await
            .unwrap();

        assert!(!response.is_ok());
        assert_eq!(response.message.as_deref(), Some("slow down"));
    }

    #[tokio::test]
    async fn test_fetch_http_error_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client_for(&mock_server)
            .fetch(DEFAULT_QUERY, DEFAULT_SORT_BY, &key())
            .await;

        match result {
            Err(FetchError::HttpStatus(500)) => {}
            other => panic!("Expected HttpStatus(500), got {:?}", other.map(|r| r.status)),
        }
    }

    #[tokio::test]
    async fn test_fetch_malformed_body_is_decode_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&mock_server)
            .await;

        let result = client_for(&mock_server)
            .fetch(DEFAULT_QUERY, DEFAULT_SORT_BY, &key())
            .await;

        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[tokio::test]
    async fn test_network_error_hides_api_key() {
        // Nothing listens on port 9 (discard) on test machines.
        let client = NewsClient::new(reqwest::Client::new(), "http://127.0.0.1:9").unwrap();
        let err = client
            .fetch(DEFAULT_QUERY, DEFAULT_SORT_BY, &SecretString::from("super-secret"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network(_)));
        assert!(!err.to_string().contains("super-secret"));
    }

    #[test]
    fn test_base_url_without_trailing_slash() {
        let client = NewsClient::new(reqwest::Client::new(), "https://newsapi.org").unwrap();
        assert_eq!(client.endpoint.as_str(), "https://newsapi.org/v2/everything");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            NewsClient::new(reqwest::Client::new(), "not a url"),
            Err(FetchError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            NewsClient::new(reqwest::Client::new(), "ftp://example.com/"),
            Err(FetchError::InvalidBaseUrl(_))
        ));
    }
}
