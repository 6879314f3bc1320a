use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_RETRIES: u32 = 2;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching or parsing a feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The feed URL failed validation
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Downloads a feed body.
///
/// - Each attempt is bounded by `timeout` (connect, headers and body)
/// - HTTP 429 and 5xx are retried with exponential backoff (1s, 2s)
/// - Other non-2xx statuses fail immediately
/// - Bodies are limited to 10MB
pub async fn fetch_feed_bytes(
    client: &reqwest::Client,
    url: &Url,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    let mut retry_count = 0;

    loop {
        let status = match tokio::time::timeout(timeout, fetch_once(client, url))
            .await
            .map_err(|_| FetchError::Timeout(timeout))??
        {
            Ok(bytes) => return Ok(bytes),
            Err(status) => status,
        };

        let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
        if !retryable {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        if retry_count >= MAX_RETRIES {
            return Err(if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                FetchError::RateLimited(MAX_RETRIES)
            } else {
                FetchError::HttpStatus(status.as_u16())
            });
        }

        let delay_secs = 1u64 << retry_count; // 1s, 2s
        tracing::warn!(
            feed = %url,
            status = %status,
            retry = retry_count + 1,
            delay_secs = delay_secs,
            "Feed fetch failed, retrying after delay"
        );
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        retry_count += 1;
    }
}

/// One GET. A non-2xx status is returned as `Ok(Err(status))` so the caller
/// can decide whether to retry.
async fn fetch_once(
    client: &reqwest::Client,
    url: &Url,
) -> Result<Result<Vec<u8>, reqwest::StatusCode>, FetchError> {
    let response = client.get(url.as_str()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Ok(Err(status));
    }
    read_limited_bytes(response, MAX_FEED_SIZE).await.map(Ok)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>Test</title></item>
</channel></rss>"#;

    fn feed_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/feed", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let bytes = fetch_feed_bytes(&client, &feed_url(&mock_server), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(bytes, VALID_RSS.as_bytes());
    }

    #[tokio::test]
    async fn test_fetch_404_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result =
            fetch_feed_bytes(&client, &feed_url(&mock_server), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn test_fetch_503_retry_then_success() {
        let mock_server = MockServer::start().await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result =
            fetch_feed_bytes(&client, &feed_url(&mock_server), Duration::from_secs(5)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result =
            fetch_feed_bytes(&client, &feed_url(&mock_server), Duration::from_millis(100)).await;
        assert!(matches!(result, Err(FetchError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; MAX_FEED_SIZE + 1]))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result =
            fetch_feed_bytes(&client, &feed_url(&mock_server), Duration::from_secs(10)).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge)));
    }
}
