use reqwest::redirect::Policy;
use reqwest::RequestBuilder;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::outcome::{classify_import, BatchOutcome};
use super::payload::{encode_batch, BatchValidationError};
use super::search::{classify_search, SearchOutcome, SearchPayload};
use crate::config::{Config, Timeouts};
use crate::record::SubmissionRecord;
use crate::util::{truncate_chars, validate_url, UrlValidationError};

/// Characters of a non-JSON body kept for diagnostics.
const MAX_DIAGNOSTIC_CHARS: usize = 800;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid backend URL: {0}")]
    InvalidBaseUrl(#[from] UrlValidationError),
    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Shared HTTP client for the backend and for feed downloads.
///
/// Timeouts are applied per call, so none is set here.
pub fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .user_agent(concat!("audioport/", env!("CARGO_PKG_VERSION")))
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Client for the transcript backend's `/import`, `/search` and `/health`.
///
/// Never retries: a failed submission is reported once and left to the caller.
#[derive(Debug, Clone)]
pub struct SyncClient {
    http: reqwest::Client,
    import_url: Url,
    search_url: Url,
    health_url: Url,
    timeouts: Timeouts,
}

impl SyncClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        Self::with_http_client(build_http_client()?, config)
    }

    pub fn with_http_client(http: reqwest::Client, config: &Config) -> Result<Self, ClientError> {
        let base = validate_url(&config.api_base_url)?;
        Ok(Self {
            http,
            import_url: endpoint(&base, "import")?,
            search_url: endpoint(&base, "search")?,
            health_url: endpoint(&base, "health")?,
            timeouts: config.timeouts,
        })
    }

    /// Submits a batch as one `POST /import`.
    ///
    /// The whole batch is validated first; an invalid record means no
    /// request is made. Transport problems come back as
    /// [`BatchOutcome::TransportError`], not as `Err`.
    pub async fn submit(
        &self,
        records: &[SubmissionRecord],
    ) -> Result<BatchOutcome, BatchValidationError> {
        let wire = encode_batch(records)?;
        tracing::info!(url = %self.import_url, count = wire.len(), "Submitting import batch");

        let request = self.http.post(self.import_url.clone()).json(&wire);
        let outcome = match exchange(request, self.timeouts.submit()).await {
            Ok((status, body)) => classify_import(status, &body, records.len()),
            Err(reason) => BatchOutcome::TransportError(reason),
        };
        Ok(outcome)
    }

    /// Runs a query against `GET /search` with a JSON body.
    pub async fn search(&self, payload: &SearchPayload) -> SearchOutcome {
        tracing::info!(url = %self.search_url, query = %payload.semantic_search_query, "Sending search request");

        let request = self.http.get(self.search_url.clone()).json(payload);
        match exchange(request, self.timeouts.search()).await {
            Ok((status, body)) => classify_search(status, body),
            Err(reason) => SearchOutcome::TransportError(reason),
        }
    }

    /// True iff `GET /health` answers 200 within the health timeout.
    pub async fn health(&self) -> bool {
        let timeout = self.timeouts.health();
        let request = self.http.get(self.health_url.clone());

        match tokio::time::timeout(timeout, request.send()).await {
            Ok(Ok(response)) => {
                let healthy = response.status() == reqwest::StatusCode::OK;
                tracing::debug!(status = %response.status(), healthy, "Health check finished");
                healthy
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %self.health_url, error = %e, "Health check failed");
                false
            }
            Err(_) => {
                tracing::warn!(url = %self.health_url, timeout_secs = timeout.as_secs(), "Health check timed out");
                false
            }
        }
    }
}

fn endpoint(base: &Url, name: &str) -> Result<Url, UrlValidationError> {
    let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), name);
    Ok(Url::parse(&joined)?)
}

/// Sends a request and returns its status and JSON body.
///
/// `Err` carries a user-facing transport message: network failure, timeout,
/// a non-JSON content type or an unparseable body.
async fn exchange(request: RequestBuilder, timeout: Duration) -> Result<(u16, Value), String> {
    let attempt = async {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let text = response.text().await?;
        Ok::<_, reqwest::Error>((status, content_type, text))
    };

    let (status, content_type, text) = match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(parts)) => parts,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Backend request failed");
            return Err(format!("Backend request failed: {e}"));
        }
        Err(_) => {
            tracing::error!(timeout_secs = timeout.as_secs(), "Backend request timed out");
            return Err(format!("Backend request timed out after {}s", timeout.as_secs()));
        }
    };

    if !content_type.contains("application/json") {
        let body = truncate_chars(&text, MAX_DIAGNOSTIC_CHARS);
        tracing::error!(status, content_type = %content_type, body = %body, "Backend returned non-JSON response");
        return Err(format!("Backend returned non-JSON response ({status}): {body}"));
    }

    serde_json::from_str(&text)
        .map(|body| (status, body))
        .map_err(|e| {
            tracing::error!(status, error = %e, "Backend returned unparseable JSON");
            format!(
                "Backend returned invalid JSON ({status}): {}",
                truncate_chars(&text, MAX_DIAGNOSTIC_CHARS)
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: &str) -> Config {
        Config {
            api_base_url: base.to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_endpoints_hang_off_base() {
        let client = SyncClient::new(&config("http://localhost:8880/api/")).unwrap();
        assert_eq!(client.import_url.as_str(), "http://localhost:8880/api/import");
        assert_eq!(client.search_url.as_str(), "http://localhost:8880/api/search");
        assert_eq!(client.health_url.as_str(), "http://localhost:8880/api/health");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            SyncClient::new(&config("ftp://backend")),
            Err(ClientError::InvalidBaseUrl(_))
        ));
        assert!(SyncClient::new(&config("not a url")).is_err());
    }
}
