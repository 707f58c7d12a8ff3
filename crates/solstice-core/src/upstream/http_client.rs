use reqwest::{Client, ClientBuilder};
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;

use crate::upstream::errors::UpstreamError;

/// Configuration for HTTP client concurrency and pooling behavior.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Maximum number of concurrent outbound HTTP requests allowed.
    pub concurrent_limit: usize,
    /// Permit acquisition timeout in milliseconds.
    pub permit_timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self { concurrent_limit: 1000, permit_timeout_ms: 500 }
    }
}

/// HTTP client shared by forwarding and probing.
///
/// Wraps a pooled reqwest client with semaphore-based concurrency control so a
/// slow upstream cannot exhaust the process's outbound sockets. One instance is
/// shared across all providers; reqwest pools connections per host internally.
pub struct HttpClient {
    client: Client,
    permits: Arc<Semaphore>,
    permit_timeout: Duration,
}

// Default is intentionally NOT implemented because construction can fail.

impl HttpClient {
    /// Creates a new HTTP client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new() -> Result<Self, UpstreamError> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Creates a new HTTP client with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn with_config(config: HttpClientConfig) -> Result<Self, UpstreamError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(100)
            .connect_timeout(Duration::from_secs(5))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("solstice/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                UpstreamError::ConnectionFailed(format!("http client build failed: {e}"))
            })?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.concurrent_limit)),
            permit_timeout: Duration::from_millis(config.permit_timeout_ms),
        })
    }

    /// Sanitizes network errors so upstream URLs and keys never leak into
    /// client-visible messages.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_timeout() {
            "connection timed out".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() || error.is_decode() {
            "response body error".to_string()
        } else {
            "network error".to_string()
        }
    }

    /// Sends a JSON POST and returns the raw response body.
    ///
    /// Non-2xx statuses are returned as [`UpstreamError::HttpError`] carrying
    /// the status code and a body fragment truncated to 256 bytes.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::Timeout`] if permit acquisition or the request times out
    /// - [`UpstreamError::ConcurrencyLimit`] if the semaphore is closed
    /// - [`UpstreamError::HttpError`] for non-success HTTP status codes
    /// - [`UpstreamError::ConnectionFailed`] for network-level failures
    pub async fn post_json(
        &self,
        url: &str,
        body: bytes::Bytes,
        timeout: Duration,
    ) -> Result<bytes::Bytes, UpstreamError> {
        let permit = tokio::time::timeout(
            self.permit_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                available_permits = self.permits.available_permits(),
                "outbound semaphore acquisition timed out"
            );
            UpstreamError::Timeout
        })?
        .map_err(|_| UpstreamError::ConcurrencyLimit)?;

        // Held for the duration of the request; released on every return path.
        let _permit = permit;

        let result = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .timeout(timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response.bytes().await.map_err(|e| {
                        UpstreamError::ConnectionFailed(Self::sanitize_network_error(&e))
                    });
                }

                let raw_text = response.text().await.unwrap_or_default();
                let fragment = if raw_text.len() > 256 {
                    let mut end = 256;
                    while !raw_text.is_char_boundary(end) {
                        end -= 1;
                    }
                    format!("{}... (truncated)", &raw_text[..end])
                } else {
                    raw_text
                };
                Err(UpstreamError::HttpError(status.as_u16(), fragment))
            }
            Err(e) if e.is_timeout() => Err(UpstreamError::Timeout),
            Err(e) => Err(UpstreamError::ConnectionFailed(Self::sanitize_network_error(&e))),
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
