/*!
 * Timed fetch: the leaf I/O primitive
 *
 * Issues exactly one HTTP request bounded by a timeout. The raw response
 * is returned whatever its status; status interpretation belongs to the
 * retry layer and the client. Timeout and transport failures are distinct
 * kinds because they are retried unconditionally, while HTTP-level
 * failures are retried by status code.
 */

use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use thiserror::Error;

use crate::error::ApiError;

/// One outbound request, owned so attempts can be re-issued cheaply
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw response: status, headers, body. Cheap to clone (the body is
/// reference-counted), which the deduplication layer relies on.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Server-supplied retry timing, if any.
    ///
    /// Accepts both forms of `Retry-After`: delta-seconds and an absolute
    /// HTTP-date (which computes to zero when already past).
    pub fn retry_after(&self) -> Option<Duration> {
        let raw = self.headers.get(RETRY_AFTER)?.to_str().ok()?;
        if let Ok(secs) = raw.trim().parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
        let date = chrono::DateTime::parse_from_rfc2822(raw.trim()).ok()?;
        let delta = date.signed_duration_since(chrono::Utc::now());
        Some(delta.to_std().unwrap_or(Duration::ZERO))
    }

    /// Body as UTF-8 text, truncated for error messages
    pub fn text_snippet(&self) -> String {
        const MAX: usize = 200;
        let text = String::from_utf8_lossy(&self.body);
        let mut snippet: String = text.chars().take(MAX).collect();
        if text.chars().count() > MAX {
            snippet.push('…');
        }
        snippet
    }
}

/// Failure of a single attempt, before any response was received
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The attempt exceeded its deadline and was aborted
    #[error("attempt timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Connection-level failure
    #[error("transport failure: {message}")]
    Transport { message: String },
}

/// HTTP transport with a shared connection pool and a per-attempt timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a transport that authenticates every request with the given
    /// bearer token
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| ApiError::Config("api_key contains invalid characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Issue one request bounded by the configured timeout
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.fetch_with_timeout(request, self.timeout).await
    }

    /// Issue one request bounded by an explicit timeout.
    ///
    /// On timeout the in-flight request future is dropped, which aborts
    /// the underlying connection attempt or body read.
    pub async fn fetch_with_timeout(
        &self,
        request: &FetchRequest,
        timeout: Duration,
    ) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        let attempt = async {
            let mut builder = self.client.request(request.method.clone(), &request.url);
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }
            let response = builder.send().await.map_err(|e| FetchError::Transport {
                message: e.to_string(),
            })?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|e| FetchError::Transport {
                message: e.to_string(),
            })?;

            Ok(FetchResponse {
                status,
                headers,
                body,
            })
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                elapsed: started.elapsed(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_retry_after(value: &str) -> FetchResponse {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        FetchResponse {
            status: StatusCode::TOO_MANY_REQUESTS,
            headers,
            body: Bytes::new(),
        }
    }

    #[test]
    fn retry_after_parses_delta_seconds() {
        let response = response_with_retry_after("2");
        assert_eq!(response.retry_after(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn retry_after_parses_future_http_date() {
        let future = chrono::Utc::now() + chrono::Duration::seconds(30);
        let response = response_with_retry_after(&future.to_rfc2822());
        let delay = response.retry_after().expect("no delay parsed");
        assert!(delay <= Duration::from_secs(30));
        assert!(delay >= Duration::from_secs(28));
    }

    #[test]
    fn retry_after_past_date_is_zero() {
        let past = chrono::Utc::now() - chrono::Duration::seconds(30);
        let response = response_with_retry_after(&past.to_rfc2822());
        assert_eq!(response.retry_after(), Some(Duration::ZERO));
    }

    #[test]
    fn retry_after_garbage_is_none() {
        let response = response_with_retry_after("soonish");
        assert_eq!(response.retry_after(), None);
    }

    #[test]
    fn missing_retry_after_is_none() {
        let response = FetchResponse {
            status: StatusCode::TOO_MANY_REQUESTS,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        assert_eq!(response.retry_after(), None);
    }

    #[test]
    fn text_snippet_truncates_long_bodies() {
        let response = FetchResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: HeaderMap::new(),
            body: Bytes::from("x".repeat(500)),
        };
        let snippet = response.text_snippet();
        assert!(snippet.chars().count() <= 201);
        assert!(snippet.ends_with('…'));
    }
}
